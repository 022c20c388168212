use std::collections::BTreeMap;
use tracing::warn;

use crate::types::StrategyRecord;

/// In-memory strategy-id -> record mapping owned by the editor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyStore {
    strategies: BTreeMap<String, StrategyRecord>,
}

impl StrategyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a gateway snapshot. The store id is authoritative:
    /// a record whose `key` disagrees with it is rewritten.
    pub fn from_loaded(strategies: BTreeMap<String, StrategyRecord>) -> Self {
        let strategies = strategies
            .into_iter()
            .map(|(id, mut record)| {
                if record.key != id {
                    if !record.key.is_empty() {
                        warn!("Strategy {} carries key {}, using the store id", id, record.key);
                    }
                    record.key = id.clone();
                }
                (id, record)
            })
            .collect();

        Self { strategies }
    }

    pub fn get(&self, id: &str) -> Option<&StrategyRecord> {
        self.strategies.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.strategies.contains_key(id)
    }

    /// Inserts or replaces, returning the previous record.
    pub fn insert(&mut self, id: &str, record: StrategyRecord) -> Option<StrategyRecord> {
        self.strategies.insert(id.to_string(), record)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StrategyRecord)> {
        self.strategies.iter().map(|(id, record)| (id.as_str(), record))
    }

    pub fn as_map(&self) -> &BTreeMap<String, StrategyRecord> {
        &self.strategies
    }
}
