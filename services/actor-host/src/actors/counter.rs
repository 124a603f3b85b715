//! Counter actor - serialized engagement counters for one entity.
//!
//! Holds a map of counter name to non-negative count (likes, comments,
//! shares, views, saves, or any caller-defined name). All writes for one
//! entity go through this actor, so concurrent likes never race on a
//! read-modify-write.
//!
//! Every mutation is applied to a copy, written through to the store, and
//! only then committed in memory. A failed write leaves the actor exactly as
//! it was.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use engage_store::DurableStore;
use tracing::debug;

use super::framework::{Actor, ActorContext, ActorError};
use crate::protocol::{CounterCommand, CounterReply};

/// Store slot holding the counter map.
pub const COUNTERS_SLOT: &str = "counters";

/// Counter names reported even before they are first written.
pub const DEFAULT_COUNTER_FIELDS: [&str; 5] = ["likes", "comments", "shares", "views", "saves"];

/// Shared dependencies for counter actors.
#[derive(Clone)]
pub struct CounterDeps {
    /// Durable store for write-through.
    pub store: Arc<dyn DurableStore>,

    /// Counter names that always appear in `get`, reading 0 until written.
    pub known_fields: Arc<[String]>,
}

impl CounterDeps {
    /// Dependencies with the default counter names.
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            store,
            known_fields: DEFAULT_COUNTER_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }

    /// Replace the set of known counter names.
    pub fn with_known_fields(mut self, fields: impl IntoIterator<Item = String>) -> Self {
        self.known_fields = fields.into_iter().collect();
        self
    }
}

/// Actor owning the counters of a single key.
pub struct CounterActor {
    /// Entity key (actor key).
    key: String,

    /// Shared dependencies.
    deps: CounterDeps,

    /// Materialized counters. Names never written are absent and read as 0.
    counters: BTreeMap<String, u64>,
}

impl CounterActor {
    /// Current value of one counter.
    pub fn value(&self, field: &str) -> u64 {
        self.counters.get(field).copied().unwrap_or(0)
    }

    /// All known counters plus every materialized one.
    fn snapshot(&self) -> BTreeMap<String, u64> {
        let mut counts: BTreeMap<String, u64> = self
            .deps
            .known_fields
            .iter()
            .map(|field| (field.clone(), 0))
            .collect();
        counts.extend(self.counters.iter().map(|(k, v)| (k.clone(), *v)));
        counts
    }

    /// Persist `next`, then make it the live state.
    async fn commit(&mut self, next: BTreeMap<String, u64>) -> Result<(), ActorError> {
        let value = serde_json::to_value(&next)
            .map_err(|e| ActorError::StoreUnavailable(e.to_string()))?;
        self.deps.store.put(&self.key, COUNTERS_SLOT, &value).await?;
        self.counters = next;
        Ok(())
    }

    async fn init(&mut self, values: BTreeMap<String, u64>) -> Result<(), ActorError> {
        let mut next: BTreeMap<String, u64> = self
            .deps
            .known_fields
            .iter()
            .map(|field| (field.clone(), 0))
            .collect();
        next.extend(values);
        self.commit(next).await
    }

    async fn increment(&mut self, field: String, delta: u64) -> Result<(), ActorError> {
        let mut next = self.counters.clone();
        let value = next.entry(field).or_insert(0);
        *value = value.saturating_add(delta);
        self.commit(next).await
    }

    async fn decrement(&mut self, field: String, delta: u64) -> Result<(), ActorError> {
        let mut next = self.counters.clone();
        let value = next.entry(field).or_insert(0);
        *value = value.saturating_sub(delta);
        self.commit(next).await
    }

    async fn delete(&mut self) -> Result<(), ActorError> {
        self.deps.store.delete(&self.key, COUNTERS_SLOT).await?;
        self.counters.clear();
        Ok(())
    }
}

#[async_trait]
impl Actor for CounterActor {
    const KIND: &'static str = "counter";
    type Command = CounterCommand;
    type Reply = CounterReply;
    type Deps = CounterDeps;

    async fn hydrate(key: &str, deps: &CounterDeps) -> Result<Self, ActorError> {
        let counters = match deps.store.get(key, COUNTERS_SLOT).await? {
            Some(value) => serde_json::from_value(value).map_err(|e| {
                ActorError::StoreUnavailable(format!("corrupt counter record: {e}"))
            })?,
            None => BTreeMap::new(),
        };

        Ok(Self {
            key: key.to_string(),
            deps: deps.clone(),
            counters,
        })
    }

    async fn handle(
        &mut self,
        command: CounterCommand,
        ctx: &mut ActorContext,
    ) -> Result<CounterReply, ActorError> {
        match command {
            CounterCommand::Init { values } => {
                debug!(actor_id = %ctx.actor_id, fields = values.len(), "Initializing counters");
                self.init(values).await?;
            }
            CounterCommand::Get => return Ok(CounterReply::Counts(self.snapshot())),
            CounterCommand::Increment { field, delta } => self.increment(field, delta).await?,
            CounterCommand::Decrement { field, delta } => self.decrement(field, delta).await?,
            CounterCommand::Delete => {
                debug!(actor_id = %ctx.actor_id, "Deleting counters");
                self.delete().await?;
            }
        }
        Ok(CounterReply::ack())
    }
}
