//! Test doubles shared by engage crates.
//!
//! - [`FlakyStore`]: wraps a [`DurableStore`] and fails on demand
//! - [`init_tracing`]: installs a test-writer subscriber once per process

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use engage_store::{DurableStore, MemoryStore, StoreError};

/// Store wrapper that can be switched into failing mode.
///
/// Reads and writes are forwarded to the inner store while healthy. While
/// failing, every call returns [`StoreError::Unavailable`] and nothing
/// reaches the inner store.
pub struct FlakyStore<S = MemoryStore> {
    inner: S,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    gets: AtomicU64,
    puts: AtomicU64,
    deletes: AtomicU64,
}

impl FlakyStore<MemoryStore> {
    /// Healthy store over a fresh [`MemoryStore`].
    pub fn new() -> Arc<Self> {
        Arc::new(Self::wrap(MemoryStore::new()))
    }
}

impl<S: DurableStore> FlakyStore<S> {
    /// Wrap an existing store.
    pub fn wrap(inner: S) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            gets: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Make subsequent reads fail (or succeed again).
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes and deletes fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Successful `get` calls so far.
    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::SeqCst)
    }

    /// Successful `put` calls so far.
    pub fn puts(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    /// Successful `delete` calls so far.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Access the wrapped store, bypassing fault injection.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: DurableStore> DurableStore for FlakyStore<S> {
    async fn get(&self, key: &str, slot: &str) -> Result<Option<serde_json::Value>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".to_string()));
        }
        let value = self.inner.get(key, slot).await?;
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    }

    async fn put(
        &self,
        key: &str,
        slot: &str,
        value: &serde_json::Value,
    ) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        self.inner.put(key, slot, value).await?;
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &str, slot: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected delete failure".to_string()));
        }
        self.inner.delete(key, slot).await?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".to_string()));
        }
        self.inner.health_check().await
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,engage_actor_host=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
