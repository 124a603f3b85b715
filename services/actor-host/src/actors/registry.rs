//! Actor registry and router.
//!
//! Maps an actor key to the single live instance for that key and routes
//! commands to it. Instances are created lazily on first use and hydrate
//! from the durable store before handling anything.
//!
//! ## Lifecycle of one key
//!
//! ```text
//! absent --dispatch--> hydrating --ok--> running --idle/shutdown--> draining --> absent
//!                          |
//!                          +--error--> (queued commands fail) --> absent
//! ```
//!
//! A draining instance refuses new commands. A dispatcher that hits one
//! waits for its task to finish the drain and exit, then starts a fresh
//! instance, so two instances for the same key never run at once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::framework::{
    generate_actor_id, run_actor_loop, Actor, ActorError, ActorHandle, Envelope,
};

/// Registry tuning.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Mailbox capacity per instance.
    pub mailbox_capacity: usize,

    /// Evict instances after this long without a command. `None` keeps them
    /// until shutdown.
    pub idle_timeout: Option<Duration>,

    /// How long `shutdown` waits for instances to drain before aborting them.
    pub shutdown_grace: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
            idle_timeout: Some(Duration::from_secs(300)), // 5 minutes
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

struct Entry<A: Actor> {
    handle: ActorHandle<A>,
    task: JoinHandle<()>,
}

type Entries<A> = Arc<Mutex<HashMap<String, Entry<A>>>>;

/// Routes commands to one actor instance per key.
pub struct ActorRegistry<A: Actor> {
    /// Dependencies handed to each new instance.
    deps: A::Deps,

    /// Registry tuning.
    config: RegistryConfig,

    /// Live instances by key.
    entries: Entries<A>,

    /// Shutdown signal shared with every instance.
    shutdown_tx: watch::Sender<bool>,
}

impl<A: Actor> ActorRegistry<A> {
    /// Create an empty registry.
    pub fn new(deps: A::Deps, config: RegistryConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            deps,
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
            shutdown_tx,
        }
    }

    /// Deliver `command` to the instance for `key` and wait for its reply.
    ///
    /// Commands for one key are applied one at a time in the order they
    /// enter that instance's mailbox. Commands for different keys run
    /// independently.
    pub async fn dispatch(&self, key: &str, command: A::Command) -> Result<A::Reply, ActorError> {
        let (reply_to, reply) = oneshot::channel();
        let mut envelope = Envelope { command, reply_to };

        loop {
            let handle = self.handle_for(key)?;
            match handle.send(envelope).await {
                Ok(()) => break,
                Err(returned) => {
                    debug!(
                        actor_id = %handle.actor_id(),
                        key = %key,
                        "Instance is draining, waiting to rehydrate"
                    );
                    handle.exited().await;
                    self.remove_if_current(key, &handle);
                    envelope = returned;
                }
            }
        }

        reply.await.map_err(|_| ActorError::ActorStopped)?
    }

    /// Number of live instances.
    pub fn active_count(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether an instance for `key` is currently in memory.
    pub fn is_active(&self, key: &str) -> bool {
        lock(&self.entries).contains_key(key)
    }

    /// Stop every instance and refuse further commands.
    ///
    /// Instances finish the commands already in their mailboxes. Any that
    /// are still running after the grace period are aborted.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);

        let entries: Vec<(String, Entry<A>)> = lock(&self.entries).drain().collect();
        info!(kind = A::KIND, count = entries.len(), "Stopping all actors");

        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace;
        for (key, mut entry) in entries {
            if tokio::time::timeout_at(deadline, &mut entry.task)
                .await
                .is_err()
            {
                warn!(
                    actor_id = %entry.handle.actor_id(),
                    key = %key,
                    "Force aborting actor"
                );
                entry.task.abort();
            }
        }
    }

    /// Look up the instance for `key`, spawning one if absent.
    ///
    /// Insert-if-absent happens under the map lock so concurrent cold starts
    /// for the same key converge on one instance.
    fn handle_for(&self, key: &str) -> Result<ActorHandle<A>, ActorError> {
        let mut entries = lock(&self.entries);

        if *self.shutdown_tx.borrow() {
            return Err(ActorError::ActorStopped);
        }

        if let Some(entry) = entries.get(key) {
            return Ok(entry.handle.clone());
        }

        let entry = self.spawn_instance(key);
        let handle = entry.handle.clone();
        entries.insert(key.to_string(), entry);
        Ok(handle)
    }

    fn spawn_instance(&self, key: &str) -> Entry<A> {
        let actor_id = format!("{}_{}", A::KIND, generate_actor_id());
        let (tx, rx) = tokio::sync::mpsc::channel(self.config.mailbox_capacity);
        let (exited_tx, exited_rx) = watch::channel(false);
        let handle = ActorHandle::new(tx, actor_id.clone(), exited_rx);

        let task = tokio::spawn({
            let key = key.to_string();
            let deps = self.deps.clone();
            let shutdown = self.shutdown_tx.subscribe();
            let idle_timeout = self.config.idle_timeout;
            let entries = Arc::clone(&self.entries);
            let own_handle = handle.clone();
            async move {
                run_actor_loop::<A>(key.clone(), deps, rx, shutdown, idle_timeout, actor_id)
                    .await;
                remove_entry(&entries, &key, &own_handle);
                exited_tx.send_replace(true);
            }
        });

        debug!(actor_id = %handle.actor_id(), key = %key, kind = A::KIND, "Spawned actor");

        Entry { handle, task }
    }

    fn remove_if_current(&self, key: &str, handle: &ActorHandle<A>) {
        remove_entry(&self.entries, key, handle);
    }
}

/// Remove the entry for `key` only if it still points at `handle`'s instance.
fn remove_entry<A: Actor>(entries: &Entries<A>, key: &str, handle: &ActorHandle<A>) {
    let mut entries = lock(entries);
    if entries
        .get(key)
        .is_some_and(|entry| entry.handle.same_instance(handle))
    {
        entries.remove(key);
    }
}

fn lock<A: Actor>(entries: &Entries<A>) -> MutexGuard<'_, HashMap<String, Entry<A>>> {
    // The map holds no invariants a panicking holder could break halfway
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
