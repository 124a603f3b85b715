//! Presence actor - live viewer registry for one entity.
//!
//! Tracks which sessions are watching a key (a live post, a video room)
//! using heartbeats. There is no background timer: stale sessions are swept
//! lazily whenever the actor hydrates, registers a session, or counts.
//!
//! ## Session lifecycle
//!
//! ```text
//! absent --register--> active --heartbeat--> active
//!                        |
//!                        +--deregister / no heartbeat for timeout--> absent
//! ```
//!
//! A session is stale once `now - last_heartbeat > timeout`. At exactly the
//! timeout it is still live.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use engage_store::DurableStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::framework::{Actor, ActorContext, ActorError};
use crate::clock::Clock;
use crate::protocol::{PresenceCommand, PresenceReply, Viewer};

/// Store slot holding the session map.
pub const VIEWERS_SLOT: &str = "viewers";

/// Default heartbeat timeout.
pub const DEFAULT_PRESENCE_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Shared dependencies for presence actors.
#[derive(Clone)]
pub struct PresenceDeps {
    /// Durable store for write-through.
    pub store: Arc<dyn DurableStore>,

    /// Time source for heartbeats.
    pub clock: Arc<dyn Clock>,

    /// Sessions without a heartbeat for longer than this are dropped.
    pub timeout: Duration,
}

impl PresenceDeps {
    pub fn new(store: Arc<dyn DurableStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            timeout: DEFAULT_PRESENCE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Persisted state of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub user_id: String,
    pub last_heartbeat: i64,
}

type Sessions = BTreeMap<String, PresenceEntry>;

/// Actor owning the viewer sessions of a single key.
pub struct PresenceActor {
    /// Entity key (actor key).
    key: String,

    /// Shared dependencies.
    deps: PresenceDeps,

    /// Session ID to entry.
    sessions: Sessions,
}

impl PresenceActor {
    /// Number of sessions currently held, stale or not.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn timeout_millis(&self) -> i64 {
        self.deps.timeout.as_millis() as i64
    }

    /// Drop stale sessions from `sessions`, returning how many were dropped.
    fn sweep(sessions: &mut Sessions, now: i64, timeout_millis: i64) -> usize {
        let before = sessions.len();
        sessions.retain(|_, entry| now.saturating_sub(entry.last_heartbeat) <= timeout_millis);
        before - sessions.len()
    }

    async fn persist(&self, sessions: &Sessions) -> Result<(), ActorError> {
        let value = serde_json::to_value(sessions)
            .map_err(|e| ActorError::StoreUnavailable(e.to_string()))?;
        self.deps.store.put(&self.key, VIEWERS_SLOT, &value).await?;
        Ok(())
    }

    /// Persist `next`, then make it the live state.
    async fn commit(&mut self, next: Sessions) -> Result<(), ActorError> {
        self.persist(&next).await?;
        self.sessions = next;
        Ok(())
    }

    async fn register(&mut self, user_id: String, session_id: String) -> Result<usize, ActorError> {
        let now = self.deps.clock.now_millis();
        let mut next = self.sessions.clone();
        Self::sweep(&mut next, now, self.timeout_millis());
        next.insert(
            session_id,
            PresenceEntry {
                user_id,
                last_heartbeat: now,
            },
        );
        self.commit(next).await?;
        Ok(self.sessions.len())
    }

    async fn heartbeat(&mut self, session_id: &str) -> Result<usize, ActorError> {
        if !self.sessions.contains_key(session_id) {
            // Unknown sessions are not resurrected
            return Ok(self.sessions.len());
        }

        let now = self.deps.clock.now_millis();
        let mut next = self.sessions.clone();
        if let Some(entry) = next.get_mut(session_id) {
            entry.last_heartbeat = now;
        }
        self.commit(next).await?;
        Ok(self.sessions.len())
    }

    async fn deregister(&mut self, session_id: &str) -> Result<usize, ActorError> {
        if self.sessions.contains_key(session_id) {
            let mut next = self.sessions.clone();
            next.remove(session_id);
            self.commit(next).await?;
        }
        Ok(self.sessions.len())
    }

    async fn count(&mut self, ctx: &ActorContext) -> PresenceReply {
        let now = self.deps.clock.now_millis();
        let timeout = self.timeout_millis();
        let dropped = Self::sweep(&mut self.sessions, now, timeout);

        if dropped > 0 {
            // Stale sessions are invisible either way; a failed write only
            // delays their removal from storage
            if let Err(e) = self.persist(&self.sessions).await {
                warn!(actor_id = %ctx.actor_id, error = %e, "Failed to persist presence sweep");
            }
        }

        let viewers: Vec<Viewer> = self
            .sessions
            .values()
            .map(|entry| Viewer {
                user_id: entry.user_id.clone(),
                last_heartbeat: entry.last_heartbeat,
            })
            .collect();

        PresenceReply::Viewers {
            count: viewers.len(),
            viewers,
        }
    }
}

#[async_trait]
impl Actor for PresenceActor {
    const KIND: &'static str = "presence";
    type Command = PresenceCommand;
    type Reply = PresenceReply;
    type Deps = PresenceDeps;

    async fn hydrate(key: &str, deps: &PresenceDeps) -> Result<Self, ActorError> {
        let mut sessions: Sessions = match deps.store.get(key, VIEWERS_SLOT).await? {
            Some(value) => serde_json::from_value(value).map_err(|e| {
                ActorError::StoreUnavailable(format!("corrupt presence record: {e}"))
            })?,
            None => BTreeMap::new(),
        };

        let actor = {
            let now = deps.clock.now_millis();
            let dropped = Self::sweep(&mut sessions, now, deps.timeout.as_millis() as i64);
            let actor = Self {
                key: key.to_string(),
                deps: deps.clone(),
                sessions,
            };
            if dropped > 0 {
                debug!(key = %key, dropped, "Dropped stale sessions on hydration");
                if let Err(e) = actor.persist(&actor.sessions).await {
                    warn!(key = %key, error = %e, "Failed to persist presence sweep");
                }
            }
            actor
        };

        Ok(actor)
    }

    async fn handle(
        &mut self,
        command: PresenceCommand,
        ctx: &mut ActorContext,
    ) -> Result<PresenceReply, ActorError> {
        let viewer_count = match command {
            PresenceCommand::Register {
                user_id,
                session_id,
            } => {
                debug!(actor_id = %ctx.actor_id, session_id = %session_id, "Registering session");
                self.register(user_id, session_id).await?
            }
            PresenceCommand::Heartbeat { session_id } => self.heartbeat(&session_id).await?,
            PresenceCommand::Deregister { session_id } => {
                debug!(actor_id = %ctx.actor_id, session_id = %session_id, "Deregistering session");
                self.deregister(&session_id).await?
            }
            PresenceCommand::Count => return Ok(self.count(ctx).await),
        };
        Ok(PresenceReply::viewer_count(viewer_count))
    }
}
