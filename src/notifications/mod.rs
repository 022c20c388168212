use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Notification severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

/// Types of notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AlertType {
    // Gateway
    RequestFailed { action: String, message: String },
    SystemStarted,
    SystemStartFailed { status: String },
    DataRefreshed,

    // Trading
    TradeSubmitted { code: String },
    TradeFailed { code: String, message: String },
    MarginEligibility { code: String, eligible: bool },
    MissingStockCode,

    // Strategies
    StrategySaved { id: String },
    StrategySaveFailed { id: String, message: String },
    StrategyInvalid { id: String, message: String },
    DuplicateStrategy { id: String },
    EmptyStrategyId,

    // Configuration
    ConfigSaved { sections: usize },
    ConfigSaveFailed { section: String, message: String },
}

impl AlertType {
    /// Get default severity for this alert type
    pub fn default_severity(&self) -> Severity {
        match self {
            AlertType::RequestFailed { .. } => Severity::Error,
            AlertType::SystemStartFailed { .. } => Severity::Error,
            AlertType::TradeFailed { .. } => Severity::Error,
            AlertType::StrategySaveFailed { .. } => Severity::Error,
            AlertType::ConfigSaveFailed { .. } => Severity::Error,

            AlertType::MissingStockCode => Severity::Warning,
            AlertType::DuplicateStrategy { .. } => Severity::Warning,
            AlertType::EmptyStrategyId => Severity::Warning,
            AlertType::StrategyInvalid { .. } => Severity::Warning,

            AlertType::MarginEligibility { eligible: false, .. } => Severity::Info,

            _ => Severity::Success,
        }
    }

    /// Get a human-readable message for this alert
    pub fn message(&self) -> String {
        match self {
            AlertType::RequestFailed { action, message } => format!("{} failed: {}", action, message),
            AlertType::SystemStarted => "Trading system started".to_string(),
            AlertType::SystemStartFailed { status } => format!("Start failed: {}", status),
            AlertType::DataRefreshed => "Data refreshed".to_string(),

            AlertType::TradeSubmitted { code } => format!("Order for {} submitted", code),
            AlertType::TradeFailed { code, message } => format!("Order for {} failed: {}", code, message),
            AlertType::MarginEligibility { code, eligible: true } => {
                format!("{} supports margin trading", code)
            }
            AlertType::MarginEligibility { code, eligible: false } => {
                format!("{} does not support margin trading", code)
            }
            AlertType::MissingStockCode => "Enter a stock code first".to_string(),

            AlertType::StrategySaved { id } => format!("Strategy {} saved", id),
            AlertType::StrategySaveFailed { id, message } => format!("Saving strategy {} failed: {}", id, message),
            AlertType::StrategyInvalid { id, message } => format!("Strategy {}: {}", id, message),
            AlertType::DuplicateStrategy { id } => format!("Strategy {} already exists", id),
            AlertType::EmptyStrategyId => "Strategy id must not be empty".to_string(),

            AlertType::ConfigSaved { sections } => format!("Configuration saved ({} sections)", sections),
            AlertType::ConfigSaveFailed { section, message } => {
                format!("Saving configuration section {} failed: {}", section, message)
            }
        }
    }
}

/// A user-visible notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub alert_type: AlertType,
}

impl Notification {
    pub fn new(alert_type: AlertType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            severity: alert_type.default_severity(),
            alert_type,
        }
    }

    pub fn message(&self) -> String {
        self.alert_type.message()
    }
}

/// Bounded, newest-first history of notifications.
#[derive(Clone)]
pub struct NotificationManager {
    notifications: Arc<RwLock<VecDeque<Notification>>>,
    max_notifications: usize,
}

impl NotificationManager {
    pub fn new(max_notifications: usize) -> Self {
        Self {
            notifications: Arc::new(RwLock::new(VecDeque::new())),
            max_notifications: max_notifications.max(1),
        }
    }

    /// Send a notification
    pub async fn notify(&self, alert_type: AlertType) {
        let notification = Notification::new(alert_type);

        let message = notification.message();
        match notification.severity {
            Severity::Error => error!("{}", message),
            Severity::Warning => warn!("{}", message),
            Severity::Info | Severity::Success => info!("{}", message),
        }

        let mut notifications = self.notifications.write().await;
        notifications.push_front(notification);
        notifications.truncate(self.max_notifications);
    }

    /// Get all notifications
    pub async fn get_all(&self) -> Vec<Notification> {
        self.notifications.read().await.iter().cloned().collect()
    }

    /// Get recent notifications
    pub async fn get_recent(&self, limit: usize) -> Vec<Notification> {
        let notifications = self.notifications.read().await;
        notifications.iter().take(limit).cloned().collect()
    }

    /// Removes and returns everything, oldest first.
    pub async fn drain(&self) -> Vec<Notification> {
        let mut notifications = self.notifications.write().await;
        notifications.drain(..).rev().collect()
    }
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new(200)
    }
}

/// Wraps a gateway failure for a named user action.
pub fn request_failed(action: &str, error: &impl std::fmt::Display) -> AlertType {
    AlertType::RequestFailed {
        action: action.to_string(),
        message: error.to_string(),
    }
}
