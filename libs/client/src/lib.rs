//! Actor host API client.
//!
//! Used by request handlers elsewhere in the product (like, view, watch
//! page) to talk to the actor host:
//! - Typed methods for every counter and presence command
//! - Best-effort helpers that never fail the caller's own action

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors returned by [`ActorClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a response (connect failure, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The actor host answered with a non-success status.
    #[error("actor host returned {status}: {code}: {detail}")]
    Status {
        status: StatusCode,
        code: String,
        detail: String,
        retryable: bool,
    },

    /// The response body did not match the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The base URL cannot have path segments appended.
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),
}

impl ClientError {
    /// Whether retrying the same command may succeed.
    ///
    /// Transport failures count as retryable, but the command may already
    /// have been applied.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { retryable, .. } => *retryable,
            Self::Decode(_) | Self::InvalidBaseUrl(_) => false,
        }
    }
}

/// One live viewer session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewer {
    pub user_id: String,
    /// Epoch milliseconds.
    pub last_heartbeat: i64,
}

/// Result of the presence `count` command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ViewerList {
    pub count: usize,
    pub viewers: Vec<Viewer>,
}

#[derive(Debug, Deserialize)]
struct Ack {
    ok: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewerCount {
    viewer_count: usize,
}

#[derive(Debug, Deserialize)]
struct Problem {
    code: String,
    detail: String,
    #[serde(default)]
    retryable: bool,
}

#[derive(Serialize)]
struct FieldRequest<'a> {
    field: &'a str,
    delta: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest<'a> {
    user_id: &'a str,
    session_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionRequest<'a> {
    session_id: &'a str,
}

/// Actor host API client.
#[derive(Debug, Clone)]
pub struct ActorClient {
    client: reqwest::Client,
    base_url: Url,
}

impl ActorClient {
    /// Create a client with its own connection pool.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Self::with_client(client, base_url)
    }

    /// Create a client sharing an existing `reqwest::Client`.
    pub fn with_client(client: reqwest::Client, base_url: Url) -> Result<Self, ClientError> {
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl(base_url.to_string()));
        }
        Ok(Self { client, base_url })
    }

    // =========================================================================
    // Counters
    // =========================================================================

    /// Overwrite the counters of `key`.
    pub async fn init_counters(
        &self,
        key: &str,
        values: &BTreeMap<String, u64>,
    ) -> Result<(), ClientError> {
        self.ack("counters", key, "init", values).await
    }

    /// Read the counters of `key`.
    pub async fn counts(&self, key: &str) -> Result<BTreeMap<String, u64>, ClientError> {
        self.post("counters", key, "get", &json!({})).await
    }

    /// Raise one counter by `delta`.
    pub async fn increment(&self, key: &str, field: &str, delta: u64) -> Result<(), ClientError> {
        self.ack("counters", key, "increment", &FieldRequest { field, delta })
            .await
    }

    /// Lower one counter by `delta`, clamped at zero.
    pub async fn decrement(&self, key: &str, field: &str, delta: u64) -> Result<(), ClientError> {
        self.ack("counters", key, "decrement", &FieldRequest { field, delta })
            .await
    }

    /// Remove all counters of `key`.
    pub async fn delete_counters(&self, key: &str) -> Result<(), ClientError> {
        self.ack("counters", key, "delete", &json!({})).await
    }

    // =========================================================================
    // Presence
    // =========================================================================

    /// Register a viewer session, returning the live viewer count.
    pub async fn register(
        &self,
        key: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<usize, ClientError> {
        let body = RegisterRequest {
            user_id,
            session_id,
        };
        let reply: ViewerCount = self.post("presence", key, "register", &body).await?;
        Ok(reply.viewer_count)
    }

    /// Refresh a viewer session.
    pub async fn heartbeat(&self, key: &str, session_id: &str) -> Result<usize, ClientError> {
        let reply: ViewerCount = self
            .post("presence", key, "heartbeat", &SessionRequest { session_id })
            .await?;
        Ok(reply.viewer_count)
    }

    /// Remove a viewer session.
    pub async fn deregister(&self, key: &str, session_id: &str) -> Result<usize, ClientError> {
        let reply: ViewerCount = self
            .post("presence", key, "deregister", &SessionRequest { session_id })
            .await?;
        Ok(reply.viewer_count)
    }

    /// List live viewers of `key`.
    pub async fn viewers(&self, key: &str) -> Result<ViewerList, ClientError> {
        self.post("presence", key, "count", &json!({})).await
    }

    // =========================================================================
    // Best-effort helpers
    // =========================================================================

    /// Counters from the actor host, or `fallback()` when it cannot answer.
    pub async fn counts_or_else<F>(&self, key: &str, fallback: F) -> BTreeMap<String, u64>
    where
        F: FnOnce() -> BTreeMap<String, u64>,
    {
        match self.counts(key).await {
            Ok(counts) => counts,
            Err(e) => {
                warn!(key = %key, error = %e, "Actor counts unavailable, using fallback");
                fallback()
            }
        }
    }

    /// Increment by one, logging instead of failing. Returns whether it applied.
    pub async fn try_increment(&self, key: &str, field: &str) -> bool {
        match self.increment(key, field, 1).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, field = %field, error = %e, "Best-effort increment failed");
                false
            }
        }
    }

    /// Decrement by one, logging instead of failing. Returns whether it applied.
    pub async fn try_decrement(&self, key: &str, field: &str) -> bool {
        match self.decrement(key, field, 1).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, field = %field, error = %e, "Best-effort decrement failed");
                false
            }
        }
    }

    // =========================================================================
    // Transport
    // =========================================================================

    fn command_url(&self, kind: &str, key: &str, command: &str) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["v1", kind, key, command]);
        Ok(url)
    }

    async fn ack<B: Serialize + ?Sized>(
        &self,
        kind: &str,
        key: &str,
        command: &str,
        body: &B,
    ) -> Result<(), ClientError> {
        let ack: Ack = self.post(kind, key, command, body).await?;
        if !ack.ok {
            return Err(ClientError::Status {
                status: StatusCode::OK,
                code: "not_acknowledged".to_string(),
                detail: format!("{command} was not acknowledged"),
                retryable: false,
            });
        }
        Ok(())
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        kind: &str,
        key: &str,
        command: &str,
        body: &B,
    ) -> Result<R, ClientError> {
        let url = self.command_url(kind, key, command)?;
        debug!(url = %url, "Sending actor command");

        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let err = match serde_json::from_slice::<Problem>(&bytes) {
                Ok(problem) => ClientError::Status {
                    status,
                    code: problem.code,
                    detail: problem.detail,
                    retryable: problem.retryable,
                },
                Err(_) => ClientError::Status {
                    status,
                    code: "unknown".to_string(),
                    detail: String::from_utf8_lossy(&bytes).into_owned(),
                    retryable: status.is_server_error(),
                },
            };
            debug!(status = %status, error = %err, "Actor command failed");
            return Err(err);
        }

        Ok(serde_json::from_slice(&bytes)?)
    }
}
