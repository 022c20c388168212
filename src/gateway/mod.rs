pub mod error;
pub mod http;

pub use error::*;
pub use http::*;

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::config::ServiceConfig;
use crate::types::{
    AssetSummary, DealBook, HoldingsReport, StartAck, StatusReport, StrategyRecord, TradeRequest,
};

/// The backend HTTP JSON service. Every method is a single round trip; nothing retries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountGateway: Send + Sync {
    async fn status(&self) -> Result<StatusReport, GatewayError>;
    async fn start(&self) -> Result<StartAck, GatewayError>;
    async fn stocks(&self, account: &str) -> Result<HoldingsReport, GatewayError>;
    async fn assets(&self, account: &str) -> Result<AssetSummary, GatewayError>;
    async fn deals(&self, account: &str) -> Result<DealBook, GatewayError>;
    async fn trade(&self, request: &TradeRequest) -> Result<serde_json::Value, GatewayError>;
    async fn margin_eligible(&self, code: &str) -> Result<bool, GatewayError>;
    async fn strategies(&self) -> Result<BTreeMap<String, StrategyRecord>, GatewayError>;
    async fn config(&self) -> Result<ServiceConfig, GatewayError>;
    async fn save_config(&self, section: &str, data: &serde_json::Value) -> Result<(), GatewayError>;
}
