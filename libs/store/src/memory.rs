//! In-memory store for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{DurableStore, StoreError};

/// Process-local store. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<(String, String), serde_json::Value>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, key: &str, slot: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let records = self.records.read().await;
        Ok(records.get(&(key.to_string(), slot.to_string())).cloned())
    }

    async fn put(
        &self,
        key: &str,
        slot: &str,
        value: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.insert((key.to_string(), slot.to_string()), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str, slot: &str) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.remove(&(key.to_string(), slot.to_string()));
        Ok(())
    }
}
