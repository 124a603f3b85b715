//! Command protocol shared by the HTTP surface and the actors.
//!
//! Each actor kind accepts a closed set of commands. Requests arrive as a
//! command name plus a JSON body and are decoded here, at the registry
//! boundary, into typed commands. Anything outside the schema is rejected
//! before it reaches an actor.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::actors::ActorError;

/// Longest accepted actor key, in bytes.
pub const MAX_KEY_LEN: usize = 256;

/// Longest accepted counter name, session ID, or user ID, in bytes.
pub const MAX_NAME_LEN: usize = 128;

/// A command family addressable by name over the wire.
pub trait WireCommand: Sized {
    /// Every command name the family accepts.
    const COMMANDS: &'static [&'static str];

    /// Names of commands that never change state.
    const QUERIES: &'static [&'static str];

    /// Decode a command from its name and JSON body.
    fn decode(command: &str, body: &[u8]) -> Result<Self, ActorError>;

    /// Whether `command` names a known command that changes state.
    fn is_mutating(command: &str) -> bool {
        Self::COMMANDS.contains(&command) && !Self::QUERIES.contains(&command)
    }
}

// =============================================================================
// Counter Commands
// =============================================================================

/// Commands accepted by the counter actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterCommand {
    /// Overwrite all counters with the given starting values.
    Init { values: BTreeMap<String, u64> },
    /// Read all counters.
    Get,
    /// Raise one counter.
    Increment { field: String, delta: u64 },
    /// Lower one counter, clamped at zero.
    Decrement { field: String, delta: u64 },
    /// Remove all persisted state for the key.
    Delete,
}

impl CounterCommand {
    /// Decode a counter command from its name and JSON body.
    pub fn decode(command: &str, body: &[u8]) -> Result<Self, ActorError> {
        match command {
            "init" => {
                let values: BTreeMap<String, u64> = parse_body(body)?;
                for field in values.keys() {
                    validate_name("counter name", field)?;
                }
                Ok(Self::Init { values })
            }
            "get" => {
                expect_empty(body)?;
                Ok(Self::Get)
            }
            "increment" => {
                let req: FieldRequest = parse_body(body)?;
                validate_name("field", &req.field)?;
                Ok(Self::Increment {
                    field: req.field,
                    delta: req.delta,
                })
            }
            "decrement" => {
                let req: FieldRequest = parse_body(body)?;
                validate_name("field", &req.field)?;
                Ok(Self::Decrement {
                    field: req.field,
                    delta: req.delta,
                })
            }
            "delete" => {
                expect_empty(body)?;
                Ok(Self::Delete)
            }
            other => Err(ActorError::UnknownCommand(other.to_string())),
        }
    }
}

impl WireCommand for CounterCommand {
    const COMMANDS: &'static [&'static str] = &["init", "get", "increment", "decrement", "delete"];
    const QUERIES: &'static [&'static str] = &["get"];

    fn decode(command: &str, body: &[u8]) -> Result<Self, ActorError> {
        Self::decode(command, body)
    }
}

/// Reply from the counter actor, serialized as the response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CounterReply {
    /// `{"ok": true}`
    Ack { ok: bool },
    /// `{"likes": 3, "comments": 0, ...}`
    Counts(BTreeMap<String, u64>),
}

impl CounterReply {
    pub fn ack() -> Self {
        Self::Ack { ok: true }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldRequest {
    field: String,
    #[serde(default = "default_delta")]
    delta: u64,
}

fn default_delta() -> u64 {
    1
}

// =============================================================================
// Presence Commands
// =============================================================================

/// Commands accepted by the presence actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceCommand {
    /// Add or refresh a viewer session.
    Register { user_id: String, session_id: String },
    /// Refresh an existing session. Unknown sessions are ignored.
    Heartbeat { session_id: String },
    /// Remove a session.
    Deregister { session_id: String },
    /// List live viewers.
    Count,
}

impl PresenceCommand {
    /// Decode a presence command from its name and JSON body.
    pub fn decode(command: &str, body: &[u8]) -> Result<Self, ActorError> {
        match command {
            "register" => {
                let req: RegisterRequest = parse_body(body)?;
                validate_name("userId", &req.user_id)?;
                validate_name("sessionId", &req.session_id)?;
                Ok(Self::Register {
                    user_id: req.user_id,
                    session_id: req.session_id,
                })
            }
            "heartbeat" => {
                let req: SessionRequest = parse_body(body)?;
                validate_name("sessionId", &req.session_id)?;
                Ok(Self::Heartbeat {
                    session_id: req.session_id,
                })
            }
            "deregister" => {
                let req: SessionRequest = parse_body(body)?;
                validate_name("sessionId", &req.session_id)?;
                Ok(Self::Deregister {
                    session_id: req.session_id,
                })
            }
            "count" => {
                expect_empty(body)?;
                Ok(Self::Count)
            }
            other => Err(ActorError::UnknownCommand(other.to_string())),
        }
    }
}

impl WireCommand for PresenceCommand {
    const COMMANDS: &'static [&'static str] = &["register", "heartbeat", "deregister", "count"];
    const QUERIES: &'static [&'static str] = &["count"];

    fn decode(command: &str, body: &[u8]) -> Result<Self, ActorError> {
        Self::decode(command, body)
    }
}

/// Public view of one live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewer {
    pub user_id: String,
    /// Epoch milliseconds of the last register or heartbeat.
    pub last_heartbeat: i64,
}

/// Reply from the presence actor, serialized as the response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PresenceReply {
    /// `{"success": true, "viewerCount": 2}`
    ViewerCount {
        success: bool,
        #[serde(rename = "viewerCount")]
        viewer_count: usize,
    },
    /// `{"count": 2, "viewers": [...]}`
    Viewers { count: usize, viewers: Vec<Viewer> },
}

impl PresenceReply {
    pub fn viewer_count(viewer_count: usize) -> Self {
        Self::ViewerCount {
            success: true,
            viewer_count,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RegisterRequest {
    user_id: String,
    session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct SessionRequest {
    session_id: String,
}

// =============================================================================
// Helpers
// =============================================================================

/// Validate an actor key taken from the request path.
pub fn validate_key(key: &str) -> Result<(), ActorError> {
    if key.trim().is_empty() {
        return Err(ActorError::InvalidPayload("key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(ActorError::InvalidPayload(format!(
            "key cannot exceed {MAX_KEY_LEN} bytes"
        )));
    }
    Ok(())
}

fn validate_name(what: &str, value: &str) -> Result<(), ActorError> {
    if value.trim().is_empty() {
        return Err(ActorError::InvalidPayload(format!("{what} cannot be empty")));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(ActorError::InvalidPayload(format!(
            "{what} cannot exceed {MAX_NAME_LEN} bytes"
        )));
    }
    Ok(())
}

/// Parse a JSON body. An empty body reads as `{}`.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ActorError> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| ActorError::InvalidPayload(e.to_string()))
}

/// Commands without parameters accept an empty body or `{}` only.
fn expect_empty(body: &[u8]) -> Result<(), ActorError> {
    let fields: serde_json::Map<String, serde_json::Value> = parse_body(body)?;
    match fields.keys().next() {
        None => Ok(()),
        Some(field) => Err(ActorError::InvalidPayload(format!(
            "unexpected field `{field}`"
        ))),
    }
}
