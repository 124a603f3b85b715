//! Core actor framework types and traits.
//!
//! Provides the fundamental building blocks for keyed actors:
//! - `Actor` trait for defining hydration and command handling
//! - `ActorHandle` for delivering commands to a running instance
//! - `ActorError` shared by every actor kind
//! - The per-instance run loop with idle eviction

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use engage_store::StoreError;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

// =============================================================================
// Core Traits
// =============================================================================

/// Marker trait for actor commands.
pub trait Message: Send + Debug + 'static {}

impl<T: Send + Debug + 'static> Message for T {}

/// The Actor trait defines behavior for a keyed actor.
///
/// Actors:
/// - Are bound to exactly one key for their whole life
/// - Process commands one at a time (no internal concurrency)
/// - Own mutable state not shared with other actors
/// - Persist every mutation before replying
#[async_trait]
pub trait Actor: Sized + Send + 'static {
    /// Actor kind for ids and logging.
    const KIND: &'static str;

    /// The command type this actor handles.
    type Command: Message;

    /// The reply produced for each command.
    type Reply: Send + Debug + 'static;

    /// Shared dependencies handed to every instance of this kind.
    type Deps: Clone + Send + Sync + 'static;

    /// Load the state for `key` from durable storage.
    ///
    /// Runs inside the instance task before its first command.
    async fn hydrate(key: &str, deps: &Self::Deps) -> Result<Self, ActorError>;

    /// Apply a single command.
    async fn handle(
        &mut self,
        command: Self::Command,
        ctx: &mut ActorContext,
    ) -> Result<Self::Reply, ActorError>;
}

/// Context provided to actors during command handling.
#[derive(Debug)]
pub struct ActorContext {
    /// Actor's unique ID.
    pub actor_id: String,

    /// Key the actor is bound to.
    pub key: String,

    /// Command counter for metrics.
    pub messages_processed: u64,

    /// Last command processing time.
    pub last_message_at: Option<Instant>,

    /// Current actor state (for introspection).
    pub state: ActorState,
}

impl ActorContext {
    /// Create a new actor context.
    pub fn new(actor_id: String, key: String) -> Self {
        Self {
            actor_id,
            key,
            messages_processed: 0,
            last_message_at: None,
            state: ActorState::Starting,
        }
    }
}

/// Actor lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
    /// Actor is hydrating.
    Starting,
    /// Actor is running and processing commands.
    Running,
    /// Actor has closed its mailbox and is draining queued commands.
    Stopping,
    /// Actor has stopped.
    Stopped,
    /// Actor failed to hydrate.
    Failed,
}

// =============================================================================
// Errors
// =============================================================================

/// Errors returned by actor commands.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActorError {
    /// Malformed or missing command fields. Caller error, never retried.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Command name not known to the actor kind. Caller error.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Durable store could not be read or written. Safe to retry: no
    /// partial state is exposed when this is returned.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Actor has stopped (registry shut down or reply dropped).
    #[error("actor stopped")]
    ActorStopped,
}

impl ActorError {
    /// Whether retrying the same command may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::ActorStopped)
    }
}

impl From<StoreError> for ActorError {
    fn from(err: StoreError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

// =============================================================================
// Actor Handle
// =============================================================================

/// A command paired with the channel its reply goes back on.
pub(crate) struct Envelope<A: Actor> {
    pub(crate) command: A::Command,
    pub(crate) reply_to: oneshot::Sender<Result<A::Reply, ActorError>>,
}

impl<A: Actor> Debug for Envelope<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

/// Handle for sending commands to a running actor instance.
pub struct ActorHandle<A: Actor> {
    /// Sender for the actor's mailbox.
    tx: mpsc::Sender<Envelope<A>>,

    /// Actor ID for logging.
    actor_id: String,

    /// Becomes `true` once the instance task has finished.
    exited: watch::Receiver<bool>,
}

impl<A: Actor> Clone for ActorHandle<A> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            actor_id: self.actor_id.clone(),
            exited: self.exited.clone(),
        }
    }
}

impl<A: Actor> ActorHandle<A> {
    pub(crate) fn new(
        tx: mpsc::Sender<Envelope<A>>,
        actor_id: String,
        exited: watch::Receiver<bool>,
    ) -> Self {
        Self {
            tx,
            actor_id,
            exited,
        }
    }

    /// Queue an envelope, handing it back if the instance no longer accepts commands.
    pub(crate) async fn send(&self, envelope: Envelope<A>) -> Result<(), Envelope<A>> {
        self.tx
            .send(envelope)
            .await
            .map_err(|mpsc::error::SendError(envelope)| envelope)
    }

    /// Wait until the instance task has finished, including its drain.
    ///
    /// A closed mailbox only means the instance stopped accepting commands;
    /// it may still be applying queued ones.
    pub(crate) async fn exited(&self) {
        let mut exited = self.exited.clone();
        // A dropped sender means the task is gone as well
        let _ = exited.wait_for(|done| *done).await;
    }

    /// Whether both handles address the same instance.
    pub(crate) fn same_instance(&self, other: &Self) -> bool {
        self.tx.same_channel(&other.tx)
    }

    /// Get the actor ID.
    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }
}

// =============================================================================
// Actor Loop
// =============================================================================

/// Why an instance left its main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitReason {
    Idle,
    Shutdown,
    MailboxClosed,
}

enum Next<M> {
    Message(M),
    Idle,
    Closed,
}

async fn next_envelope<M>(rx: &mut mpsc::Receiver<M>, idle_timeout: Option<Duration>) -> Next<M> {
    match idle_timeout {
        Some(timeout) => match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(msg)) => Next::Message(msg),
            Ok(None) => Next::Closed,
            Err(_) => Next::Idle,
        },
        None => match rx.recv().await {
            Some(msg) => Next::Message(msg),
            None => Next::Closed,
        },
    }
}

/// Run one actor instance until it is evicted, shut down, or orphaned.
///
/// The mailbox is always closed and drained before returning, so every
/// command that was accepted gets a reply from this instance. A fresh
/// instance for the same key may hydrate only after this returns.
pub(crate) async fn run_actor_loop<A: Actor>(
    key: String,
    deps: A::Deps,
    mut rx: mpsc::Receiver<Envelope<A>>,
    mut shutdown: watch::Receiver<bool>,
    idle_timeout: Option<Duration>,
    actor_id: String,
) {
    let mut ctx = ActorContext::new(actor_id.clone(), key.clone());

    let mut actor = match A::hydrate(&key, &deps).await {
        Ok(actor) => actor,
        Err(e) => {
            warn!(actor_id = %actor_id, key = %key, error = %e, "Actor failed to hydrate");
            ctx.state = ActorState::Failed;
            rx.close();
            while let Some(envelope) = rx.recv().await {
                let _ = envelope.reply_to.send(Err(e.clone()));
            }
            return;
        }
    };

    ctx.state = ActorState::Running;
    debug!(actor_id = %actor_id, key = %key, "Actor hydrated");

    let reason = loop {
        if *shutdown.borrow() {
            break ExitReason::Shutdown;
        }

        tokio::select! {
            biased;

            // Check shutdown first
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break ExitReason::Shutdown;
                }
            }

            next = next_envelope(&mut rx, idle_timeout) => {
                match next {
                    Next::Message(envelope) => deliver(&mut actor, envelope, &mut ctx).await,
                    Next::Idle => break ExitReason::Idle,
                    Next::Closed => break ExitReason::MailboxClosed,
                }
            }
        }
    };

    // No new commands from here on; finish the ones already accepted
    ctx.state = ActorState::Stopping;
    rx.close();
    while let Some(envelope) = rx.recv().await {
        deliver(&mut actor, envelope, &mut ctx).await;
    }
    ctx.state = ActorState::Stopped;

    info!(
        actor_id = %actor_id,
        key = %key,
        reason = ?reason,
        messages_processed = ctx.messages_processed,
        "Actor stopped"
    );
}

async fn deliver<A: Actor>(actor: &mut A, envelope: Envelope<A>, ctx: &mut ActorContext) {
    let Envelope { command, reply_to } = envelope;

    ctx.messages_processed += 1;
    ctx.last_message_at = Some(Instant::now());

    debug!(actor_id = %ctx.actor_id, command = ?command, "Handling command");

    let result = actor.handle(command, ctx).await;
    if let Err(e) = &result {
        warn!(actor_id = %ctx.actor_id, key = %ctx.key, error = %e, "Command failed");
    }

    // The caller may have given up waiting; the command still counts as applied
    let _ = reply_to.send(result);
}

// =============================================================================
// Helpers
// =============================================================================

static ACTOR_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

pub(crate) fn generate_actor_id() -> u64 {
    ACTOR_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

// =============================================================================
// Tests
// =============================================================================
