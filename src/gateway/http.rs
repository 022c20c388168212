use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::{AccountGateway, GatewayError};
use crate::config::{ClientSettings, ServiceConfig};
use crate::types::{
    AssetSummary, AssetsReport, DealBook, DealsReport, HoldingsReport, StartAck, StatusReport,
    StrategyRecord, TradeRequest,
};

/// reqwest-backed client for the account gateway.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| GatewayError::Transport {
                endpoint: base_url.to_string(),
                source,
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self, GatewayError> {
        Self::new(
            &settings.gateway_url,
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, GatewayError> {
        let request = self.client.get(self.url(path)).query(query);
        self.send(path, request).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, GatewayError> {
        let request = self.client.post(self.url(path)).json(body);
        self.send(path, request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let resp = request
            .send()
            .await
            .map_err(|source| GatewayError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GatewayError::status(
                endpoint,
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
            ));
        }

        let bytes = resp.bytes().await.map_err(|source| GatewayError::Transport {
            endpoint: endpoint.to_string(),
            source,
        })?;
        debug!("{} answered {} bytes", endpoint, bytes.len());

        serde_json::from_slice(&bytes).map_err(|e| GatewayError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl AccountGateway for HttpGateway {
    async fn status(&self) -> Result<StatusReport, GatewayError> {
        self.get_json("/status", &[]).await
    }

    async fn start(&self) -> Result<StartAck, GatewayError> {
        self.get_json("/start", &[]).await
    }

    async fn stocks(&self, account: &str) -> Result<HoldingsReport, GatewayError> {
        self.get_json("/stocks", &[("account", account)]).await
    }

    async fn assets(&self, account: &str) -> Result<AssetSummary, GatewayError> {
        let report: AssetsReport = self.get_json("/assets", &[("account", account)]).await?;
        Ok(report.assets)
    }

    async fn deals(&self, account: &str) -> Result<DealBook, GatewayError> {
        let report: DealsReport = self.get_json("/deals", &[("account", account)]).await?;
        Ok(report.deals)
    }

    async fn trade(&self, request: &TradeRequest) -> Result<serde_json::Value, GatewayError> {
        let body = serde_json::to_value(request).map_err(|e| GatewayError::Decode {
            endpoint: "/trade".to_string(),
            message: e.to_string(),
        })?;
        self.post_json("/trade", &body).await
    }

    async fn margin_eligible(&self, code: &str) -> Result<bool, GatewayError> {
        self.get_json("/rzrq", &[("code", code)]).await
    }

    async fn strategies(&self) -> Result<BTreeMap<String, StrategyRecord>, GatewayError> {
        let raw: Option<BTreeMap<String, StrategyRecord>> = self.get_json("/iunstrs", &[]).await?;
        Ok(raw.unwrap_or_default())
    }

    async fn config(&self) -> Result<ServiceConfig, GatewayError> {
        self.get_json("/config", &[]).await
    }

    async fn save_config(&self, section: &str, data: &serde_json::Value) -> Result<(), GatewayError> {
        let body = json!({ "section": section, "data": data });
        let _ack: serde_json::Value = self.post_json("/config", &body).await?;
        Ok(())
    }
}
