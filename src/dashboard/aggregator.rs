use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::views::{flatten_deals, sort_deals_desc, RecentDeal};
use crate::gateway::{AccountGateway, GatewayError};
use crate::types::{account_label, AssetSummary, DealBook, HoldingsReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FetchKind {
    Holdings,
    Assets,
    Deals,
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchKind::Holdings => write!(f, "holdings"),
            FetchKind::Assets => write!(f, "assets"),
            FetchKind::Deals => write!(f, "deals"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountFailure {
    pub account: String,
    pub kind: FetchKind,
    pub message: String,
}

impl AccountFailure {
    fn new(account: &str, kind: FetchKind, error: &GatewayError) -> Self {
        warn!("Fetching {} for account {} failed: {}", kind, account, error);
        Self {
            account: account.to_string(),
            kind,
            message: error.to_string(),
        }
    }
}

/// Holdings and asset summary of one account from a single refresh pass.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    pub account: String,
    pub holdings: HoldingsReport,
    pub assets: AssetSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    pub account: String,
    pub label: String,
    pub holding_count: usize,
    pub available_money: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total_assets: Decimal,
    pub available_money: Decimal,
    pub position_value: Decimal,
    pub accounts: Vec<AccountSummary>,
    pub recent_deals: Vec<RecentDeal>,
    pub failures: Vec<AccountFailure>,
}

impl DashboardSummary {
    pub fn recent(&self, limit: usize) -> &[RecentDeal] {
        &self.recent_deals[..self.recent_deals.len().min(limit)]
    }
}

/// Fans the dashboard queries out over every account.
pub struct DashboardAggregator {
    gateway: Arc<dyn AccountGateway>,
}

impl DashboardAggregator {
    pub fn new(gateway: Arc<dyn AccountGateway>) -> Self {
        Self { gateway }
    }

    /// One pass: snapshots and deals of all accounts are requested at once.
    /// Failed fetches drop out of the totals and are listed in `failures`.
    pub async fn refresh(&self, accounts: &[String]) -> DashboardSummary {
        let snapshots = join_all(accounts.iter().map(|account| self.snapshot(account)));
        let deals = join_all(accounts.iter().map(|account| async move {
            let result = self.gateway.deals(account).await;
            (account.clone(), result)
        }));

        let (snapshots, deals) = tokio::join!(snapshots, deals);

        let summary = reduce(snapshots, deals);
        debug!(
            "Dashboard refreshed: {} accounts, {} deals, {} failures",
            summary.accounts.len(),
            summary.recent_deals.len(),
            summary.failures.len()
        );
        summary
    }

    pub async fn snapshot(&self, account: &str) -> Result<AccountSnapshot, Vec<AccountFailure>> {
        let (holdings, assets) = tokio::join!(self.gateway.stocks(account), self.gateway.assets(account));

        match (holdings, assets) {
            (Ok(holdings), Ok(assets)) => Ok(AccountSnapshot {
                account: account.to_string(),
                holdings,
                assets,
            }),
            (holdings, assets) => {
                let mut failures = Vec::new();
                if let Err(e) = holdings {
                    failures.push(AccountFailure::new(account, FetchKind::Holdings, &e));
                }
                if let Err(e) = assets {
                    failures.push(AccountFailure::new(account, FetchKind::Assets, &e));
                }
                Err(failures)
            }
        }
    }
}

/// Folds per-account results into the summary. Account order follows the input.
pub fn reduce(
    snapshots: Vec<Result<AccountSnapshot, Vec<AccountFailure>>>,
    deals: Vec<(String, Result<DealBook, GatewayError>)>,
) -> DashboardSummary {
    let mut summary = DashboardSummary::default();

    for snapshot in snapshots {
        match snapshot {
            Ok(snapshot) => {
                summary.total_assets += snapshot.assets.pure_assets();
                summary.available_money += snapshot.assets.available_money();
                summary.position_value += snapshot
                    .holdings
                    .stocks
                    .iter()
                    .map(|holding| holding.market_value())
                    .sum::<Decimal>();

                summary.accounts.push(AccountSummary {
                    label: account_label(&snapshot.account),
                    holding_count: snapshot.holdings.stocks.len(),
                    available_money: snapshot.assets.available_money(),
                    account: snapshot.account,
                });
            }
            Err(failures) => summary.failures.extend(failures),
        }
    }

    for (account, result) in deals {
        match result {
            Ok(book) => summary.recent_deals.extend(flatten_deals(&account, &book)),
            Err(e) => summary.failures.push(AccountFailure::new(&account, FetchKind::Deals, &e)),
        }
    }
    sort_deals_desc(&mut summary.recent_deals);

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::gateway::MockAccountGateway;
    use crate::types::{StartAck, StatusReport, StrategyRecord, TradeRequest};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::time::Duration;

    fn accounts(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn holdings(account: &str) -> HoldingsReport {
        serde_json::from_value(json!({
            "account": account,
            "stocks": [{"code": "600000", "holdCount": 100, "latestPrice": 10}]
        }))
        .unwrap()
    }

    fn deals_at(time: &str) -> DealBook {
        serde_json::from_value(json!({
            "600000": [{"time": time, "tradeType": "B", "price": 10, "count": 100}]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_failed_account_is_left_out_of_totals() {
        let mut gateway = MockAccountGateway::new();
        gateway.expect_stocks().returning(|account| Ok(holdings(account)));
        gateway.expect_assets().returning(|account| {
            if account == "A" {
                Ok(serde_json::from_value(json!({"pure_assets": 1000, "available_money": 400})).unwrap())
            } else {
                Err(GatewayError::status("/assets", 500, "Internal Server Error"))
            }
        });
        gateway.expect_deals().returning(|_| Ok(DealBook::default()));

        let aggregator = DashboardAggregator::new(Arc::new(gateway));
        let summary = aggregator.refresh(&accounts(&["A", "B"])).await;

        assert_eq!(summary.total_assets, dec!(1000));
        assert_eq!(summary.available_money, dec!(400));
        assert_eq!(summary.position_value, dec!(1000));
        assert_eq!(summary.accounts.len(), 1);
        assert_eq!(summary.accounts[0].account, "A");
        assert_eq!(summary.accounts[0].holding_count, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].account, "B");
        assert_eq!(summary.failures[0].kind, FetchKind::Assets);
        assert_eq!(summary.failures[0].message, "HTTP 500: Internal Server Error (/assets)");
    }

    #[tokio::test]
    async fn test_recent_deals_merge_across_accounts() {
        let mut gateway = MockAccountGateway::new();
        gateway.expect_stocks().returning(|account| Ok(holdings(account)));
        gateway.expect_assets().returning(|_| Ok(AssetSummary::default()));
        gateway.expect_deals().returning(|account| match account {
            "A" => Ok(deals_at("09:30:01")),
            "B" => Ok(deals_at("09:30:05")),
            _ => Err(GatewayError::status("/deals", 503, "Service Unavailable")),
        });

        let aggregator = DashboardAggregator::new(Arc::new(gateway));
        let summary = aggregator.refresh(&accounts(&["A", "B", "C"])).await;

        let times: Vec<&str> = summary.recent_deals.iter().map(|d| d.time.as_str()).collect();
        assert_eq!(times, vec!["09:30:05", "09:30:01"]);
        assert_eq!(summary.recent_deals[0].account, "B");

        let order: Vec<&str> = summary.accounts.iter().map(|a| a.account.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].kind, FetchKind::Deals);
        assert_eq!(summary.recent(1).len(), 1);
    }

    /// Answers holdings in the order they finish; account `A` is held back.
    struct LaggingGateway {
        answered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AccountGateway for LaggingGateway {
        async fn status(&self) -> Result<StatusReport, GatewayError> {
            Ok(StatusReport::default())
        }
        async fn start(&self) -> Result<StartAck, GatewayError> {
            Ok(StartAck::default())
        }
        async fn stocks(&self, account: &str) -> Result<HoldingsReport, GatewayError> {
            if account == "A" {
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
            self.answered.lock().unwrap().push(account.to_string());
            Ok(holdings(account))
        }
        async fn assets(&self, _account: &str) -> Result<AssetSummary, GatewayError> {
            Ok(AssetSummary::default())
        }
        async fn deals(&self, _account: &str) -> Result<DealBook, GatewayError> {
            Ok(DealBook::default())
        }
        async fn trade(&self, _request: &TradeRequest) -> Result<serde_json::Value, GatewayError> {
            Ok(serde_json::Value::Null)
        }
        async fn margin_eligible(&self, _code: &str) -> Result<bool, GatewayError> {
            Ok(false)
        }
        async fn strategies(&self) -> Result<BTreeMap<String, StrategyRecord>, GatewayError> {
            Ok(BTreeMap::new())
        }
        async fn config(&self) -> Result<ServiceConfig, GatewayError> {
            Ok(ServiceConfig::default())
        }
        async fn save_config(&self, _section: &str, _data: &serde_json::Value) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_accounts_keep_request_order() {
        let gateway = Arc::new(LaggingGateway { answered: Mutex::new(Vec::new()) });
        let aggregator = DashboardAggregator::new(gateway.clone());

        let summary = aggregator.refresh(&accounts(&["A", "B", "C"])).await;

        assert_eq!(*gateway.answered.lock().unwrap(), vec!["B", "C", "A"]);
        let order: Vec<&str> = summary.accounts.iter().map(|a| a.account.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
        assert!(summary.failures.is_empty());
    }

    #[test]
    fn test_reduce_of_nothing_is_zero() {
        let summary = reduce(Vec::new(), Vec::new());
        assert_eq!(summary.total_assets, Decimal::ZERO);
        assert!(summary.accounts.is_empty());
        assert!(summary.recent(10).is_empty());
    }
}
