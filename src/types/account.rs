use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// `GET /status` payload. Missing fields fall back to a stopped, account-less system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub accounts: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemState {
    Connecting,
    Running,
    Stopped,
    Error,
}

impl SystemState {
    pub fn from_report(report: &StatusReport) -> Self {
        if report.running {
            SystemState::Running
        } else if report.status.as_deref() == Some("error") {
            SystemState::Error
        } else {
            SystemState::Stopped
        }
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemState::Connecting => write!(f, "Connecting"),
            SystemState::Running => write!(f, "Running"),
            SystemState::Stopped => write!(f, "Stopped"),
            SystemState::Error => write!(f, "Connection failed"),
        }
    }
}

/// `GET /start` acknowledgement.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartAck {
    #[serde(default)]
    pub status: String,
}

impl StartAck {
    pub fn started(&self) -> bool {
        self.status == "started"
    }
}

/// One stock position as reported by `GET /stocks`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hold_count: Option<Decimal>,
    #[serde(default)]
    pub available_count: Option<Decimal>,
    #[serde(default)]
    pub hold_cost: Option<Decimal>,
    #[serde(default)]
    pub latest_price: Option<Decimal>,
}

impl Holding {
    /// Market value, or zero when either the count or the price is missing.
    pub fn market_value(&self) -> Decimal {
        match (self.hold_count, self.latest_price) {
            (Some(count), Some(price)) => count * price,
            _ => Decimal::ZERO,
        }
    }

    /// Floating profit against the holding cost, or zero when price or cost is missing.
    pub fn floating_profit(&self) -> Decimal {
        match (self.latest_price, self.hold_cost) {
            (Some(price), Some(cost)) if !price.is_zero() && !cost.is_zero() => {
                (price - cost) * self.hold_count.unwrap_or(Decimal::ZERO)
            }
            _ => Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HoldingsReport {
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stocks: Vec<Holding>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetSummary {
    #[serde(default)]
    pub pure_assets: Option<Decimal>,
    #[serde(default)]
    pub available_money: Option<Decimal>,
}

impl AssetSummary {
    pub fn pure_assets(&self) -> Decimal {
        self.pure_assets.unwrap_or(Decimal::ZERO)
    }

    pub fn available_money(&self) -> Decimal {
        self.available_money.unwrap_or(Decimal::ZERO)
    }
}

/// `GET /assets` envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetsReport {
    #[serde(default, deserialize_with = "null_as_default")]
    pub assets: AssetSummary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeType {
    #[serde(rename = "B")]
    Buy,
    #[serde(rename = "S")]
    Sell,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeType::Buy => write!(f, "Buy"),
            TradeType::Sell => write!(f, "Sell"),
            TradeType::Unknown => write!(f, "-"),
        }
    }
}

/// A filled deal as reported by `GET /deals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub trade_type: TradeType,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub count: Decimal,
    #[serde(default)]
    pub sid: Option<serde_json::Value>,
}

impl Deal {
    pub fn sid_text(&self) -> String {
        match &self.sid {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

/// Deals keyed by security code.
///
/// The gateway answers `{"deals": []}` when there is nothing to report, so the
/// list shape is accepted and treated as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DealBook {
    pub by_code: BTreeMap<String, Vec<Deal>>,
}

impl DealBook {
    pub fn is_empty(&self) -> bool {
        self.by_code.values().all(|deals| deals.is_empty())
    }

    pub fn len(&self) -> usize {
        self.by_code.values().map(|deals| deals.len()).sum()
    }
}

impl<'de> Deserialize<'de> for DealBook {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            ByCode(BTreeMap<String, Vec<Deal>>),
            List(Vec<serde_json::Value>),
            Nothing(()),
        }

        Ok(match Shape::deserialize(deserializer)? {
            Shape::ByCode(by_code) => DealBook { by_code },
            Shape::List(_) | Shape::Nothing(()) => DealBook::default(),
        })
    }
}

/// `GET /deals` envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DealsReport {
    #[serde(default)]
    pub deals: DealBook,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Display name for the account tokens the gateway uses.
pub fn account_label(account: &str) -> String {
    match account {
        "normal" => "Normal account".to_string(),
        "collat" => "Collateral account".to_string(),
        "credit" => "Credit account".to_string(),
        other => other.to_string(),
    }
}
