//! Application state shared across request handlers.

use std::sync::Arc;

use engage_store::DurableStore;

use crate::actors::{
    CounterDeps, CounterRegistry, PresenceDeps, PresenceRegistry, RegistryConfig,
};
use crate::clock::Clock;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<dyn DurableStore>,
    counters: CounterRegistry,
    presence: PresenceRegistry,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        store: Arc<dyn DurableStore>,
        counter_deps: CounterDeps,
        presence_deps: PresenceDeps,
        registry: RegistryConfig,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                store,
                counters: CounterRegistry::new(counter_deps, registry.clone()),
                presence: PresenceRegistry::new(presence_deps, registry),
            }),
        }
    }

    /// State with default actor settings over `store` and `clock`.
    pub fn with_defaults(store: Arc<dyn DurableStore>, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            store.clone(),
            CounterDeps::new(store.clone()),
            PresenceDeps::new(store, clock),
            RegistryConfig::default(),
        )
    }

    /// Get a reference to the durable store.
    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.inner.store
    }

    /// Get the counter actor registry.
    pub fn counters(&self) -> &CounterRegistry {
        &self.inner.counters
    }

    /// Get the presence actor registry.
    pub fn presence(&self) -> &PresenceRegistry {
        &self.inner.presence
    }

    /// Stop all actors, letting queued commands finish.
    pub async fn shutdown(&self) {
        tokio::join!(self.inner.counters.shutdown(), self.inner.presence.shutdown());
    }
}
