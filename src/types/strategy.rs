use rust_decimal::Decimal;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::warn;

/// Fields with a fixed meaning; every other key on a strategy is a custom field.
pub const STANDARD_FIELDS: [&str; 5] = ["key", "enabled", "amount", "account", "amtkey"];

/// Account tokens with a built-in meaning. Anything else is a custom account name.
pub const ACCOUNT_AUTO: &str = "";
pub const ACCOUNT_NORMAL: &str = "normal";
pub const ACCOUNT_CREDIT: &str = "credit";

pub fn is_standard_field(name: &str) -> bool {
    STANDARD_FIELDS.contains(&name)
}

pub fn is_custom_account(account: &str) -> bool {
    !matches!(account, ACCOUNT_AUTO | ACCOUNT_NORMAL | ACCOUNT_CREDIT)
}

/// Named automated-trading configuration as stored by the gateway under `iunstrs`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct StrategyRecord {
    pub key: String,
    pub enabled: bool,
    pub amount: Decimal,
    pub account: String,
    /// Position-sizing scheme. Empty strings are folded into `None`.
    pub amtkey: Option<String>,
    pub custom: BTreeMap<String, String>,
}

impl StrategyRecord {
    /// Defaults used when a strategy is created from the console.
    pub fn new_default(key: &str) -> Self {
        Self {
            key: key.to_string(),
            enabled: false,
            amount: Decimal::from(5000),
            account: ACCOUNT_AUTO.to_string(),
            amtkey: None,
            custom: BTreeMap::new(),
        }
    }

    pub fn amtkey_str(&self) -> &str {
        self.amtkey.as_deref().unwrap_or("")
    }

    pub fn amount_text(&self) -> String {
        format_amount(self.amount)
    }
}

/// Change detection used before persisting an edited strategy.
///
/// Standard fields compare by value; custom fields compare as a set of
/// key/value pairs, so reordering them never counts as a change. `key` is not
/// compared: the store id is authoritative.
pub fn has_changed(original: &StrategyRecord, updated: &StrategyRecord) -> bool {
    original.enabled != updated.enabled
        || original.amount != updated.amount
        || original.account != updated.account
        || original.amtkey != updated.amtkey
        || original.custom != updated.custom
}

pub fn format_amount(amount: Decimal) -> String {
    amount.normalize().to_string()
}

fn normalize_amtkey(raw: Option<String>) -> Option<String> {
    raw.filter(|value| !value.is_empty())
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn value_as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        _ => false,
    }
}

fn value_as_amount(key: &str, value: Option<&Value>) -> Decimal {
    let parsed = match value {
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Some(Value::String(s)) if s.trim().is_empty() => Some(Decimal::ZERO),
        Some(Value::String(s)) => Decimal::from_str(s.trim()).ok(),
        None | Some(Value::Null) => Some(Decimal::ZERO),
        Some(_) => None,
    };
    parsed.unwrap_or_else(|| {
        warn!("Strategy {} has an unreadable amount {:?}, using 0", key, value);
        Decimal::ZERO
    })
}

impl From<Map<String, Value>> for StrategyRecord {
    fn from(mut raw: Map<String, Value>) -> Self {
        let key = raw.remove("key").and_then(|v| value_as_text(&v)).unwrap_or_default();
        let enabled = raw.remove("enabled").map(|v| value_as_bool(&v)).unwrap_or(false);
        let amount = value_as_amount(&key, raw.remove("amount").as_ref());
        let account = raw
            .remove("account")
            .and_then(|v| value_as_text(&v))
            .unwrap_or_default();
        let amtkey = normalize_amtkey(raw.remove("amtkey").and_then(|v| value_as_text(&v)));

        let custom = raw
            .into_iter()
            .filter_map(|(k, v)| value_as_text(&v).map(|text| (k, text)))
            .collect();

        Self {
            key,
            enabled,
            amount,
            account,
            amtkey,
            custom,
        }
    }
}

impl Serialize for StrategyRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = 4 + usize::from(self.amtkey.is_some()) + self.custom.len();
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("key", &self.key)?;
        map.serialize_entry("enabled", &self.enabled)?;
        map.serialize_entry("amount", &self.amount_text())?;
        map.serialize_entry("account", &self.account)?;
        if let Some(amtkey) = &self.amtkey {
            map.serialize_entry("amtkey", amtkey)?;
        }
        for (k, v) in &self.custom {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn record() -> StrategyRecord {
        serde_json::from_value(json!({
            "key": "istrategy_grid",
            "enabled": true,
            "amount": "20000",
            "account": "credit",
            "amtkey": "ladder",
            "step": "0.05",
            "levels": 8
        }))
        .unwrap()
    }

    #[test]
    fn test_record_splits_standard_and_custom_fields() {
        let r = record();
        assert_eq!(r.key, "istrategy_grid");
        assert!(r.enabled);
        assert_eq!(r.amount, dec!(20000));
        assert_eq!(r.account, "credit");
        assert_eq!(r.amtkey.as_deref(), Some("ladder"));
        assert_eq!(r.custom.len(), 2);
        assert_eq!(r.custom["step"], "0.05");
        assert_eq!(r.custom["levels"], "8");
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let r: StrategyRecord = serde_json::from_value(json!({"amount": 3000.5})).unwrap();
        assert_eq!(r.key, "");
        assert!(!r.enabled);
        assert_eq!(r.amount, dec!(3000.5));
        assert_eq!(r.account, "");
        assert_eq!(r.amtkey, None);

        let bad: StrategyRecord = serde_json::from_value(json!({"amount": "lots"})).unwrap();
        assert_eq!(bad.amount, Decimal::ZERO);
    }

    #[test]
    fn test_empty_amtkey_is_absent() {
        let r: StrategyRecord =
            serde_json::from_value(json!({"key": "a", "amtkey": "", "amount": "1"})).unwrap();
        assert_eq!(r.amtkey, None);
        let out = serde_json::to_value(&r).unwrap();
        assert!(out.get("amtkey").is_none());
    }

    #[test]
    fn test_serializes_custom_fields_flat() {
        let out = serde_json::to_value(record()).unwrap();
        assert_eq!(out["amount"], "20000");
        assert_eq!(out["step"], "0.05");
        assert_eq!(out["account"], "credit");
    }

    #[test]
    fn test_has_changed_is_reflexive_false() {
        let r = record();
        assert!(!has_changed(&r, &r));
        assert!(!has_changed(&r, &r.clone()));
    }

    #[test]
    fn test_custom_field_order_does_not_matter() {
        let a: StrategyRecord =
            serde_json::from_value(json!({"key": "s", "amount": "1", "x": "1", "y": "2"})).unwrap();
        let b: StrategyRecord =
            serde_json::from_value(json!({"key": "s", "amount": "1", "y": "2", "x": "1"})).unwrap();
        assert!(!has_changed(&a, &b));
    }

    #[test]
    fn test_has_changed_detects_each_field() {
        let base = record();

        let mut r = base.clone();
        r.enabled = false;
        assert!(has_changed(&base, &r));

        let mut r = base.clone();
        r.amount = dec!(20001);
        assert!(has_changed(&base, &r));

        let mut r = base.clone();
        r.account = "normal".to_string();
        assert!(has_changed(&base, &r));

        let mut r = base.clone();
        r.amtkey = None;
        assert!(has_changed(&base, &r));

        let mut r = base.clone();
        r.custom.insert("step".to_string(), "0.1".to_string());
        assert!(has_changed(&base, &r));

        let mut r = base.clone();
        r.custom.remove("levels");
        assert!(has_changed(&base, &r));
    }

    #[test]
    fn test_numeric_amount_equality() {
        let mut a = record();
        let mut b = record();
        a.amount = dec!(5000);
        b.amount = dec!(5000.00);
        assert!(!has_changed(&a, &b));
        assert_eq!(b.amount_text(), "5000");
    }

    #[test]
    fn test_custom_account_classification() {
        assert!(!is_custom_account(""));
        assert!(!is_custom_account("normal"));
        assert!(!is_custom_account("credit"));
        assert!(is_custom_account("sim_01"));
    }
}
