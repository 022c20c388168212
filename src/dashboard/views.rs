use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Reverse;

use crate::types::{Deal, DealBook, Holding, TradeType};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y%m%d %H%M%S",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H%M%S"];

/// Parses a deal time. Bare times are placed on a common day so they order
/// among themselves; they sort before any dated time.
pub fn parse_trade_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            TIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveTime::parse_from_str(raw, fmt).ok())
                .map(|time| NaiveDate::MIN.and_time(time))
        })
}

/// One deal flattened out of the per-code deal book.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentDeal {
    pub account: String,
    pub code: String,
    pub time: String,
    pub trade_type: TradeType,
    pub price: Decimal,
    pub count: Decimal,
    pub sid: String,
}

impl RecentDeal {
    fn from_deal(account: &str, code: &str, deal: &Deal) -> Self {
        Self {
            account: account.to_string(),
            code: code.to_string(),
            time: deal.time.clone(),
            trade_type: deal.trade_type,
            price: deal.price,
            count: deal.count,
            sid: deal.sid_text(),
        }
    }
}

/// Codes in book order, deals in gateway order.
pub fn flatten_deals(account: &str, book: &DealBook) -> Vec<RecentDeal> {
    book.by_code
        .iter()
        .flat_map(|(code, deals)| deals.iter().map(move |deal| RecentDeal::from_deal(account, code, deal)))
        .collect()
}

/// Newest first; stable for equal times; unparseable times last.
pub fn sort_deals_desc(deals: &mut [RecentDeal]) {
    deals.sort_by_cached_key(|deal| {
        let time = parse_trade_time(&deal.time);
        (time.is_none(), Reverse(time))
    });
}

/// Orders view for a single account.
pub fn orders_view(account: &str, book: &DealBook) -> Vec<RecentDeal> {
    let mut deals = flatten_deals(account, book);
    sort_deals_desc(&mut deals);
    deals
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionRow {
    pub code: String,
    pub name: String,
    pub hold_count: Decimal,
    pub available_count: Decimal,
    pub hold_cost: Decimal,
    pub latest_price: Decimal,
    pub market_value: Decimal,
    pub floating_profit: Decimal,
}

impl From<&Holding> for PositionRow {
    fn from(holding: &Holding) -> Self {
        Self {
            code: holding.code.clone(),
            name: holding.name.clone().unwrap_or_default(),
            hold_count: holding.hold_count.unwrap_or_default(),
            available_count: holding.available_count.unwrap_or_default(),
            hold_cost: holding.hold_cost.unwrap_or_default(),
            latest_price: holding.latest_price.unwrap_or_default(),
            market_value: holding.market_value(),
            floating_profit: holding.floating_profit(),
        }
    }
}

pub fn positions_view(holdings: &[Holding]) -> Vec<PositionRow> {
    holdings.iter().map(PositionRow::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn deal(account: &str, time: &str) -> RecentDeal {
        RecentDeal {
            account: account.to_string(),
            code: "600000".to_string(),
            time: time.to_string(),
            trade_type: TradeType::Buy,
            price: dec!(10),
            count: dec!(100),
            sid: String::new(),
        }
    }

    #[test]
    fn test_parse_trade_time_formats() {
        assert!(parse_trade_time("2024-03-01 09:30:01").is_some());
        assert!(parse_trade_time("2024-03-01T09:30:01").is_some());
        assert!(parse_trade_time("20240301 093001").is_some());
        assert!(parse_trade_time("09:30:01").is_some());
        assert!(parse_trade_time("093001").is_some());
        assert!(parse_trade_time("yesterday").is_none());
        assert!(parse_trade_time("").is_none());
    }

    #[test]
    fn test_sort_newest_first() {
        let mut deals = vec![deal("A", "09:30:01"), deal("B", "09:30:05")];
        sort_deals_desc(&mut deals);
        assert_eq!(deals[0].time, "09:30:05");
        assert_eq!(deals[1].time, "09:30:01");
    }

    #[test]
    fn test_sort_is_stable_and_puts_garbage_last() {
        let mut deals = vec![
            deal("A", "n/a"),
            deal("A", "10:00:00"),
            deal("B", "10:00:00"),
            deal("B", "2024-03-01 14:55:00"),
        ];
        sort_deals_desc(&mut deals);

        let order: Vec<(&str, &str)> = deals.iter().map(|d| (d.account.as_str(), d.time.as_str())).collect();
        assert_eq!(
            order,
            vec![
                ("B", "2024-03-01 14:55:00"),
                ("A", "10:00:00"),
                ("B", "10:00:00"),
                ("A", "n/a"),
            ]
        );
    }

    #[test]
    fn test_orders_view_flattens_codes() {
        let book: DealBook = serde_json::from_value(json!({
            "000001": [{"time": "09:31:00", "tradeType": "S", "price": 12.3, "count": 200, "sid": 77}],
            "600000": [
                {"time": "09:30:00", "tradeType": "B", "price": 10.1, "count": 100},
                {"time": "09:35:00", "tradeType": "B", "price": 10.2, "count": 100}
            ]
        }))
        .unwrap();

        let rows = orders_view("normal", &book);
        let times: Vec<&str> = rows.iter().map(|r| r.time.as_str()).collect();
        assert_eq!(times, vec!["09:35:00", "09:31:00", "09:30:00"]);
        assert_eq!(rows[1].code, "000001");
        assert_eq!(rows[1].sid, "77");
        assert_eq!(rows[1].trade_type, TradeType::Sell);
    }

    #[test]
    fn test_position_rows() {
        let holdings: Vec<Holding> = serde_json::from_value(json!([
            {"code": "600000", "name": "PF Bank", "holdCount": 100, "availableCount": 100, "holdCost": 9, "latestPrice": 10},
            {"code": "000001", "holdCount": 50}
        ]))
        .unwrap();

        let rows = positions_view(&holdings);
        assert_eq!(rows[0].market_value, dec!(1000));
        assert_eq!(rows[0].floating_profit, dec!(100));
        assert_eq!(rows[1].name, "");
        assert_eq!(rows[1].floating_profit, Decimal::ZERO);
    }
}
