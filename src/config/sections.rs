use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::types::StrategyRecord;

/// Section labels understood by `POST /config`.
pub const DATA_SERVICE_SECTION: &str = "数据服务配置";
pub const ACCOUNT_SECTION: &str = "账户配置";
pub const CLIENT_SECTION: &str = "客户端配置";

/// Key under the client section that holds the strategy mapping.
pub const STRATEGIES_KEY: &str = "iunstrs";

/// `GET /config` payload. Unknown keys in each section are kept so they survive a save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub fha: DataServiceSection,
    #[serde(default)]
    pub unp: AccountSection,
    #[serde(default)]
    pub client: ClientSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataServiceSection {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub uemail: String,
    #[serde(default)]
    pub pwd: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSection {
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub pwd: String,
    #[serde(default)]
    pub credit: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default)]
    pub purchase_new_stocks: bool,
    #[serde(default)]
    pub port: i64,
    #[serde(default)]
    pub iunstrs: BTreeMap<String, StrategyRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One independently persisted configuration unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigSection {
    pub label: String,
    pub data: Map<String, Value>,
}

impl ConfigSection {
    pub fn new(label: &str, data: Map<String, Value>) -> Self {
        Self {
            label: label.to_string(),
            data,
        }
    }

    /// The client section carrying the whole strategy mapping.
    pub fn strategies(strategies: &BTreeMap<String, StrategyRecord>) -> Result<Self, serde_json::Error> {
        let mut data = Map::new();
        data.insert(STRATEGIES_KEY.to_string(), serde_json::to_value(strategies)?);
        Ok(Self::new(CLIENT_SECTION, data))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Email,
    Password,
    Checkbox,
    Number,
    Select(&'static [&'static str]),
}

impl FieldKind {
    /// Turns raw form text into the JSON value the gateway expects.
    pub fn coerce(&self, raw: &str) -> Value {
        match self {
            FieldKind::Checkbox => Value::Bool(matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "on" | "yes"
            )),
            FieldKind::Number => Value::from(raw.trim().parse::<i64>().unwrap_or(0)),
            _ => Value::String(raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FormField {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, Copy)]
pub struct SectionForm {
    pub label: &'static str,
    pub fields: &'static [FormField],
}

pub const LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR"];

pub const DATA_SERVICE_FORM: SectionForm = SectionForm {
    label: DATA_SERVICE_SECTION,
    fields: &[
        FormField { key: "server", label: "Server address", kind: FieldKind::Text },
        FormField { key: "uemail", label: "User email", kind: FieldKind::Email },
        FormField { key: "pwd", label: "Service password", kind: FieldKind::Password },
    ],
};

pub const ACCOUNT_FORM: SectionForm = SectionForm {
    label: ACCOUNT_SECTION,
    fields: &[
        FormField { key: "account", label: "Fund account", kind: FieldKind::Text },
        FormField { key: "pwd", label: "Trading password", kind: FieldKind::Password },
        FormField { key: "credit", label: "Enable credit trading", kind: FieldKind::Checkbox },
    ],
};

pub const CLIENT_FORM: SectionForm = SectionForm {
    label: CLIENT_SECTION,
    fields: &[
        FormField { key: "log_level", label: "Log level", kind: FieldKind::Select(LOG_LEVELS) },
        FormField { key: "purchase_new_stocks", label: "Subscribe to new stocks", kind: FieldKind::Checkbox },
        FormField { key: "port", label: "Port", kind: FieldKind::Number },
    ],
};

pub static SECTION_FORMS: [SectionForm; 3] = [DATA_SERVICE_FORM, ACCOUNT_FORM, CLIENT_FORM];

pub fn form_for(label: &str) -> Option<&'static SectionForm> {
    SECTION_FORMS.iter().find(|form| form.label == label)
}

fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

impl ServiceConfig {
    fn section_json(&self, label: &str) -> Value {
        let value = match label {
            DATA_SERVICE_SECTION => serde_json::to_value(&self.fha),
            ACCOUNT_SECTION => serde_json::to_value(&self.unp),
            CLIENT_SECTION => serde_json::to_value(&self.client),
            _ => Ok(Value::Null),
        };
        value.unwrap_or(Value::Null)
    }

    /// Current form text for every field of `form`.
    pub fn form_values(&self, form: &SectionForm) -> Vec<(FormField, String)> {
        let section = self.section_json(form.label);
        form.fields
            .iter()
            .map(|field| (*field, value_text(section.get(field.key))))
            .collect()
    }

    /// Builds every form section from the current values, with `overrides`
    /// (section label, field key, raw text) applied on top, coerced per field kind.
    pub fn form_sections(&self, overrides: &[(String, String, String)]) -> Vec<ConfigSection> {
        SECTION_FORMS
            .iter()
            .map(|form| {
                let data = self
                    .form_values(form)
                    .into_iter()
                    .map(|(field, current)| {
                        let raw = overrides
                            .iter()
                            .rev()
                            .find(|(section, key, _)| section == form.label && key == field.key)
                            .map(|(_, _, value)| value.clone())
                            .unwrap_or(current);
                        (field.key.to_string(), field.kind.coerce(&raw))
                    })
                    .collect();
                ConfigSection::new(form.label, data)
            })
            .collect()
    }
}

/// Gateway-side secrets come back `*`-prefixed; never echo them in clear.
pub fn mask_secret(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        "***".to_string()
    }
}
