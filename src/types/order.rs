use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TradeType;

/// `POST /trade` body. Legality of the order is left to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    pub code: String,
    pub trade_type: TradeType,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

impl TradeRequest {
    pub fn new(code: &str, trade_type: TradeType, price: Decimal, count: u64) -> Self {
        Self {
            code: code.trim().to_string(),
            trade_type,
            price,
            count,
            account: None,
        }
    }

    /// Routes the order to a specific account; empty names fall back to the gateway default.
    pub fn with_account(mut self, account: Option<String>) -> Self {
        self.account = account
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_trade_request_wire_shape() {
        let request = TradeRequest::new(" 600000 ", TradeType::Sell, dec!(10.52), 300)
            .with_account(Some("credit".to_string()));
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["code"], "600000");
        assert_eq!(body["tradeType"], "S");
        assert_eq!(body["count"], 300);
        assert_eq!(body["account"], "credit");
    }

    #[test]
    fn test_blank_account_is_omitted() {
        let request = TradeRequest::new("000001", TradeType::Buy, dec!(12), 100)
            .with_account(Some("  ".to_string()));
        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("account").is_none());
    }
}
