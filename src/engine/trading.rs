use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use super::ConsoleSession;
use crate::gateway::{AccountGateway, GatewayError};
use crate::notifications::{request_failed, AlertType, NotificationManager};
use crate::types::TradeRequest;

#[derive(Debug, Error)]
pub enum TradeError {
    #[error("stock code is required")]
    MissingCode,

    #[error("system did not start: {0}")]
    NotStarted(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Order entry, margin lookup and system start. Orders are passed through
/// as entered; the gateway decides whether they are legal.
pub struct TradeDesk {
    gateway: Arc<dyn AccountGateway>,
    session: ConsoleSession,
    notifications: NotificationManager,
}

impl TradeDesk {
    pub fn new(gateway: Arc<dyn AccountGateway>, session: ConsoleSession) -> Self {
        let notifications = session.notifications().clone();
        Self {
            gateway,
            session,
            notifications,
        }
    }

    pub async fn submit_trade(&self, request: &TradeRequest) -> Result<Value, TradeError> {
        if request.code.is_empty() {
            self.notifications.notify(AlertType::MissingStockCode).await;
            return Err(TradeError::MissingCode);
        }

        info!(
            "Submitting {} {} x {} @ {}",
            request.trade_type, request.code, request.count, request.price
        );

        match self.gateway.trade(request).await {
            Ok(ack) => {
                self.notifications
                    .notify(AlertType::TradeSubmitted { code: request.code.clone() })
                    .await;
                Ok(ack)
            }
            Err(e) => {
                self.notifications
                    .notify(AlertType::TradeFailed {
                        code: request.code.clone(),
                        message: e.to_string(),
                    })
                    .await;
                Err(e.into())
            }
        }
    }

    /// An empty code is answered with a warning and no request.
    pub async fn check_margin(&self, code: &str) -> Result<bool, TradeError> {
        let code = code.trim();
        if code.is_empty() {
            self.notifications.notify(AlertType::MissingStockCode).await;
            return Err(TradeError::MissingCode);
        }

        match self.gateway.margin_eligible(code).await {
            Ok(eligible) => {
                self.notifications
                    .notify(AlertType::MarginEligibility {
                        code: code.to_string(),
                        eligible,
                    })
                    .await;
                Ok(eligible)
            }
            Err(e) => {
                self.notifications.notify(request_failed("Margin lookup", &e)).await;
                Err(e.into())
            }
        }
    }

    /// Calls `/start`; the status is reloaded only once the gateway reports `started`.
    pub async fn start_system(&self) -> Result<(), TradeError> {
        match self.gateway.start().await {
            Ok(ack) if ack.started() => {
                self.notifications.notify(AlertType::SystemStarted).await;
                let _ = self.session.reload_status().await;
                Ok(())
            }
            Ok(ack) => {
                self.notifications
                    .notify(AlertType::SystemStartFailed { status: ack.status.clone() })
                    .await;
                Err(TradeError::NotStarted(ack.status))
            }
            Err(e) => {
                self.notifications.notify(request_failed("Starting system", &e)).await;
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockAccountGateway;
    use crate::notifications::Severity;
    use crate::types::{StartAck, StatusReport, SystemState, TradeType};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn desk(gateway: MockAccountGateway) -> (TradeDesk, ConsoleSession) {
        let gateway: Arc<dyn AccountGateway> = Arc::new(gateway);
        let session = ConsoleSession::new(gateway.clone(), NotificationManager::new(10));
        (TradeDesk::new(gateway, session.clone()), session)
    }

    #[tokio::test]
    async fn test_blank_code_sends_nothing() {
        let mut gateway = MockAccountGateway::new();
        gateway.expect_margin_eligible().never();
        gateway.expect_trade().never();
        let (desk, session) = desk(gateway);

        assert!(matches!(desk.check_margin("  ").await, Err(TradeError::MissingCode)));
        let order = TradeRequest::new(" ", TradeType::Buy, dec!(10), 100);
        assert!(matches!(desk.submit_trade(&order).await, Err(TradeError::MissingCode)));

        let recent = session.notifications().get_recent(1).await;
        assert_eq!(recent[0].severity, Severity::Warning);
    }

    #[tokio::test]
    async fn test_margin_answer_is_reported() {
        let mut gateway = MockAccountGateway::new();
        gateway
            .expect_margin_eligible()
            .withf(|code| code == "600000")
            .returning(|_| Ok(true));
        let (desk, session) = desk(gateway);

        assert!(desk.check_margin(" 600000 ").await.unwrap());
        let recent = session.notifications().get_recent(1).await;
        assert_eq!(
            recent[0].alert_type,
            AlertType::MarginEligibility { code: "600000".to_string(), eligible: true }
        );
    }

    #[tokio::test]
    async fn test_trade_failure_is_reported() {
        let mut gateway = MockAccountGateway::new();
        gateway
            .expect_trade()
            .withf(|request| request.code == "600000" && request.account.as_deref() == Some("credit"))
            .times(1)
            .returning(|_| Err(GatewayError::status("/trade", 400, "Bad Request")));
        let (desk, session) = desk(gateway);

        let order = TradeRequest::new("600000", TradeType::Sell, dec!(10.5), 100).with_account(Some("credit".to_string()));
        tokio_test::assert_err!(desk.submit_trade(&order).await);

        let recent = session.notifications().get_recent(1).await;
        assert!(matches!(recent[0].alert_type, AlertType::TradeFailed { .. }));
    }

    #[tokio::test]
    async fn test_start_reloads_status() {
        let mut gateway = MockAccountGateway::new();
        gateway
            .expect_start()
            .times(1)
            .returning(|| Ok(StartAck { status: "started".to_string() }));
        gateway.expect_status().times(1).returning(|| {
            Ok(serde_json::from_value::<StatusReport>(json!({"running": true, "accounts": ["normal"]})).unwrap())
        });
        let (desk, session) = desk(gateway);

        tokio_test::assert_ok!(desk.start_system().await);
        assert_eq!(session.system_state().await, SystemState::Running);
        assert_eq!(
            session.notifications().get_recent(1).await[0].alert_type,
            AlertType::SystemStarted
        );
    }

    #[tokio::test]
    async fn test_unexpected_start_status() {
        let mut gateway = MockAccountGateway::new();
        gateway
            .expect_start()
            .returning(|| Ok(StartAck { status: "already running".to_string() }));
        gateway.expect_status().never();
        let (desk, session) = desk(gateway);

        let err = desk.start_system().await.unwrap_err();
        assert!(matches!(err, TradeError::NotStarted(ref s) if s == "already running"));
        assert_eq!(session.system_state().await, SystemState::Connecting);
    }

    #[tokio::test]
    async fn test_failed_start_request_skips_status() {
        let mut gateway = MockAccountGateway::new();
        gateway
            .expect_start()
            .returning(|| Err(GatewayError::status("/start", 502, "Bad Gateway")));
        gateway.expect_status().never();
        let (desk, session) = desk(gateway);

        tokio_test::assert_err!(desk.start_system().await);
        assert_eq!(session.system_state().await, SystemState::Connecting);
    }
}
