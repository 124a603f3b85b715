//! Keyed actors for engagement state.
//!
//! Each actor owns the state of exactly one key and processes its commands
//! one at a time. The registry creates instances on demand, evicts idle
//! ones, and routes commands to them.
//!
//! ## Actors
//!
//! - `CounterActor`: per-entity engagement counters (likes, views, ...)
//! - `PresenceActor`: per-entity live viewer sessions with heartbeat expiry

pub mod counter;
pub mod framework;
pub mod presence;
pub mod registry;

pub use counter::{CounterActor, CounterDeps, COUNTERS_SLOT, DEFAULT_COUNTER_FIELDS};
pub use framework::{Actor, ActorContext, ActorError, ActorHandle, ActorState};
pub use presence::{PresenceActor, PresenceDeps, PresenceEntry, VIEWERS_SLOT};
pub use registry::{ActorRegistry, RegistryConfig};

/// Registry of counter actors.
pub type CounterRegistry = ActorRegistry<CounterActor>;

/// Registry of presence actors.
pub type PresenceRegistry = ActorRegistry<PresenceActor>;
