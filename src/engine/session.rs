use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use crate::dashboard::{DashboardAggregator, DashboardSummary};
use crate::gateway::{AccountGateway, GatewayError};
use crate::notifications::{request_failed, NotificationManager};
use crate::types::{StatusReport, SystemState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum View {
    #[default]
    Dashboard,
    Positions,
    Orders,
    Trading,
    Strategies,
    Config,
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Dashboard => write!(f, "dashboard"),
            View::Positions => write!(f, "positions"),
            View::Orders => write!(f, "orders"),
            View::Trading => write!(f, "trading"),
            View::Strategies => write!(f, "strategies"),
            View::Config => write!(f, "config"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SessionEvent {
    ViewChanged(View),
    StatusChanged(SystemState),
    DashboardUpdated,
}

#[derive(Debug, Clone)]
struct SessionData {
    view: View,
    view_generation: u64,
    state: SystemState,
    accounts: Vec<String>,
    dashboard: Option<DashboardSummary>,
    applied_refresh: u64,
}

impl Default for SessionData {
    fn default() -> Self {
        Self {
            view: View::default(),
            view_generation: 0,
            state: SystemState::Connecting,
            accounts: Vec::new(),
            dashboard: None,
            applied_refresh: 0,
        }
    }
}

/// Current view, system status, known accounts and the last dashboard summary.
///
/// Cheap to clone; clones share state, so spawned refresh ticks update the
/// same session.
#[derive(Clone)]
pub struct ConsoleSession {
    gateway: Arc<dyn AccountGateway>,
    aggregator: Arc<DashboardAggregator>,
    notifications: NotificationManager,
    inner: Arc<RwLock<SessionData>>,
    issued_refresh: Arc<AtomicU64>,
    tx: broadcast::Sender<SessionEvent>,
}

impl ConsoleSession {
    pub fn new(gateway: Arc<dyn AccountGateway>, notifications: NotificationManager) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            aggregator: Arc::new(DashboardAggregator::new(gateway.clone())),
            gateway,
            notifications,
            inner: Arc::new(RwLock::new(SessionData::default())),
            issued_refresh: Arc::new(AtomicU64::new(0)),
            tx,
        }
    }

    pub async fn view(&self) -> View {
        self.inner.read().await.view
    }

    /// Returns the new view generation; results issued under an older one are dropped.
    pub async fn switch_view(&self, view: View) -> u64 {
        let mut data = self.inner.write().await;
        data.view = view;
        data.view_generation += 1;
        debug!("Switched to {} view (generation {})", view, data.view_generation);

        let _ = self.tx.send(SessionEvent::ViewChanged(view));
        data.view_generation
    }

    pub async fn system_state(&self) -> SystemState {
        self.inner.read().await.state
    }

    pub async fn accounts(&self) -> Vec<String> {
        self.inner.read().await.accounts.clone()
    }

    pub async fn dashboard(&self) -> Option<DashboardSummary> {
        self.inner.read().await.dashboard.clone()
    }

    pub fn notifications(&self) -> &NotificationManager {
        &self.notifications
    }

    /// On failure the state becomes `Error` and the previous accounts stay.
    pub async fn reload_status(&self) -> Result<StatusReport, GatewayError> {
        match self.gateway.status().await {
            Ok(report) => {
                let state = SystemState::from_report(&report);
                {
                    let mut data = self.inner.write().await;
                    data.state = state;
                    data.accounts = report.accounts.clone();
                }
                info!("System {} with {} accounts", state, report.accounts.len());
                let _ = self.tx.send(SessionEvent::StatusChanged(state));
                Ok(report)
            }
            Err(e) => {
                self.inner.write().await.state = SystemState::Error;
                let _ = self.tx.send(SessionEvent::StatusChanged(SystemState::Error));
                self.notifications.notify(request_failed("Loading status", &e)).await;
                Err(e)
            }
        }
    }

    /// Refreshes the dashboard for the known accounts. The summary is stored
    /// only if the view has not changed meanwhile and no later refresh has
    /// already been applied; `None` means it was dropped.
    pub async fn refresh_dashboard(&self) -> Option<DashboardSummary> {
        let ticket = self.issued_refresh.fetch_add(1, Ordering::AcqRel) + 1;
        let (generation, accounts) = {
            let data = self.inner.read().await;
            (data.view_generation, data.accounts.clone())
        };

        let summary = self.aggregator.refresh(&accounts).await;

        {
            let mut data = self.inner.write().await;
            if data.view_generation != generation || ticket <= data.applied_refresh {
                debug!("Dropping dashboard refresh {} (generation {})", ticket, generation);
                return None;
            }
            data.applied_refresh = ticket;
            data.dashboard = Some(summary.clone());
        }

        if !summary.failures.is_empty() {
            let failed: Vec<String> = summary
                .failures
                .iter()
                .map(|f| format!("{} {}", f.account, f.kind))
                .collect();
            self.notifications
                .notify(request_failed("Refreshing dashboard", &failed.join(", ")))
                .await;
        }

        let _ = self.tx.send(SessionEvent::DashboardUpdated);
        Some(summary)
    }

    /// Periodic work: status first, then the dashboard when it is on screen.
    pub async fn tick(&self) {
        let _ = self.reload_status().await;
        if self.view().await == View::Dashboard {
            self.refresh_dashboard().await;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockAccountGateway;
    use crate::notifications::Severity;
    use crate::config::ServiceConfig;
    use crate::types::{AssetSummary, DealBook, HoldingsReport, StartAck, StrategyRecord, TradeRequest};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn running_status() -> StatusReport {
        serde_json::from_value(json!({"running": true, "status": "ok", "accounts": ["normal", "credit"]})).unwrap()
    }

    fn dashboard_gateway(gateway: &mut MockAccountGateway) {
        gateway.expect_stocks().returning(|_| Ok(HoldingsReport::default()));
        gateway
            .expect_assets()
            .returning(|_| Ok(serde_json::from_value::<AssetSummary>(json!({"pure_assets": 500})).unwrap()));
        gateway.expect_deals().returning(|_| Ok(DealBook::default()));
    }

    #[tokio::test]
    async fn test_status_failure_keeps_accounts() {
        let mut gateway = MockAccountGateway::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        gateway.expect_status().returning(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(running_status())
            } else {
                Err(GatewayError::status("/status", 502, "Bad Gateway"))
            }
        });

        let notifications = NotificationManager::new(10);
        let session = ConsoleSession::new(Arc::new(gateway), notifications.clone());
        assert_eq!(session.system_state().await, SystemState::Connecting);

        session.reload_status().await.unwrap();
        assert_eq!(session.system_state().await, SystemState::Running);
        assert_eq!(session.accounts().await, vec!["normal", "credit"]);

        assert!(session.reload_status().await.is_err());
        assert_eq!(session.system_state().await, SystemState::Error);
        assert_eq!(session.accounts().await, vec!["normal", "credit"]);
        assert_eq!(notifications.get_recent(1).await[0].severity, Severity::Error);
    }

    #[tokio::test]
    async fn test_tick_refreshes_visible_dashboard() {
        let mut gateway = MockAccountGateway::new();
        gateway.expect_status().returning(|| Ok(running_status()));
        dashboard_gateway(&mut gateway);

        let session = ConsoleSession::new(Arc::new(gateway), NotificationManager::new(10));
        let mut events = session.subscribe();

        session.tick().await;
        let summary = session.dashboard().await.unwrap();
        assert_eq!(summary.total_assets, dec!(1000));
        assert_eq!(summary.accounts.len(), 2);

        assert_eq!(events.recv().await.unwrap(), SessionEvent::StatusChanged(SystemState::Running));
        assert_eq!(events.recv().await.unwrap(), SessionEvent::DashboardUpdated);
    }

    #[tokio::test]
    async fn test_tick_skips_dashboard_on_other_views() {
        let mut gateway = MockAccountGateway::new();
        gateway.expect_status().returning(|| Ok(running_status()));
        gateway.expect_stocks().never();
        gateway.expect_assets().never();
        gateway.expect_deals().never();

        let session = ConsoleSession::new(Arc::new(gateway), NotificationManager::new(10));
        session.switch_view(View::Strategies).await;
        session.tick().await;

        assert!(session.dashboard().await.is_none());
        assert_eq!(session.system_state().await, SystemState::Running);
    }

    /// Answers instantly except for the first holdings request.
    struct SlowFirstGateway {
        stocks_calls: AtomicUsize,
    }

    #[async_trait]
    impl AccountGateway for SlowFirstGateway {
        async fn status(&self) -> Result<StatusReport, GatewayError> {
            Ok(StatusReport {
                running: true,
                status: None,
                accounts: vec!["normal".to_string()],
            })
        }
        async fn start(&self) -> Result<StartAck, GatewayError> {
            Ok(StartAck::default())
        }
        async fn stocks(&self, _account: &str) -> Result<HoldingsReport, GatewayError> {
            if self.stocks_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Ok(HoldingsReport::default())
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

    async fn slow_session() -> ConsoleSession {
        let gateway = SlowFirstGateway { stocks_calls: AtomicUsize::new(0) };
        let session = ConsoleSession::new(Arc::new(gateway), NotificationManager::new(10));
        session.reload_status().await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_refresh_dropped_after_view_change() {
        let session = slow_session().await;

        let other = session.clone();
        let (dropped, _) = tokio::join!(session.refresh_dashboard(), async {
            other.switch_view(View::Config).await;
        });

        assert!(dropped.is_none());
        assert!(session.dashboard().await.is_none());

        session.switch_view(View::Dashboard).await;
        assert!(session.refresh_dashboard().await.is_some());
    }

    #[tokio::test]
    async fn test_older_refresh_never_overwrites_newer() {
        let session = slow_session().await;

        let (older, newer) = tokio::join!(session.refresh_dashboard(), session.refresh_dashboard());

        assert!(newer.is_some());
        assert!(older.is_none());
        assert!(session.dashboard().await.is_some());
    }
}
