use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info};

use super::sections::ConfigSection;
use crate::gateway::{AccountGateway, GatewayError};
use crate::strategies::StrategyStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConfigChangeEvent {
    SectionPersisted { section: String },
    StrategiesPersisted { count: usize },
}

/// `persist_all` stopped part-way. Sections in `committed` are already saved
/// server-side; nothing is rolled back.
#[derive(Debug, Error)]
#[error("saving section {failed} failed after {} committed: {source}", .committed.len())]
pub struct PersistAllError {
    pub committed: Vec<String>,
    pub failed: String,
    #[source]
    pub source: GatewayError,
}

/// Writes configuration sections back to the gateway, one `POST /config` per section.
pub struct ConfigSynchronizer {
    gateway: Arc<dyn AccountGateway>,
    change_tx: broadcast::Sender<ConfigChangeEvent>,
}

impl ConfigSynchronizer {
    pub fn new(gateway: Arc<dyn AccountGateway>) -> Self {
        let (change_tx, _) = broadcast::channel(32);
        Self { gateway, change_tx }
    }

    /// Sends one section as an atomic unit. No retry.
    pub async fn persist(&self, section: &str, data: &Value) -> Result<(), GatewayError> {
        if let Err(e) = self.gateway.save_config(section, data).await {
            error!("Saving config section {} failed: {}", section, e);
            return Err(e);
        }

        info!("Config section {} saved", section);
        let _ = self.change_tx.send(ConfigChangeEvent::SectionPersisted {
            section: section.to_string(),
        });
        Ok(())
    }

    /// Persists the entire strategy store under the client section.
    ///
    /// Every single-strategy save rewrites the whole mapping; fine for the
    /// handful of strategies a desk runs, but a per-id upsert endpoint would be
    /// needed if the store grows large.
    pub async fn persist_strategies(&self, store: &StrategyStore) -> Result<(), GatewayError> {
        let section = ConfigSection::strategies(store.as_map()).map_err(|e| GatewayError::Decode {
            endpoint: "/config".to_string(),
            message: e.to_string(),
        })?;

        self.persist(&section.label, &Value::Object(section.data)).await?;

        let _ = self.change_tx.send(ConfigChangeEvent::StrategiesPersisted { count: store.len() });
        Ok(())
    }

    /// Persists sections in order, stopping at the first failure.
    pub async fn persist_all(&self, sections: &[ConfigSection]) -> Result<usize, PersistAllError> {
        let mut committed = Vec::with_capacity(sections.len());

        for section in sections {
            let data = Value::Object(section.data.clone());
            if let Err(source) = self.persist(&section.label, &data).await {
                return Err(PersistAllError {
                    committed,
                    failed: section.label.clone(),
                    source,
                });
            }
            committed.push(section.label.clone());
        }

        Ok(committed.len())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.change_tx.subscribe()
    }
}
