//! Durable per-key storage for engage actors.
//!
//! Every actor persists its full state as a single JSON document addressed by
//! `(actor key, slot)`. The slot names the actor's domain (`"counters"`,
//! `"viewers"`), so one entity key can back several actor kinds without the
//! records colliding.
//!
//! ## Backends
//!
//! - [`MemoryStore`]: process-local map for development and tests
//! - [`SqliteStore`]: SQLite file with one row per record

mod memory;
mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors from store operations.
///
/// Callers treat every variant as transient: a failed write never leaves a
/// partially applied record behind.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Key/slot addressed document storage.
///
/// Implementations must give read-after-write consistency for a single
/// `(key, slot)` pair. No ordering is promised across keys.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Load the record for `key` in `slot`, if one was ever written.
    async fn get(&self, key: &str, slot: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Replace the record for `key` in `slot`.
    async fn put(&self, key: &str, slot: &str, value: &serde_json::Value)
        -> Result<(), StoreError>;

    /// Remove the record for `key` in `slot`. Removing a missing record is not an error.
    async fn delete(&self, key: &str, slot: &str) -> Result<(), StoreError>;

    /// Check that the backend can serve requests.
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
