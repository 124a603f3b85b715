//! API v1 routes.
//!
//! Every actor kind is addressed the same way:
//!
//! ```text
//! POST /v1/{kind}/{key}/{command}   any command, JSON body (may be empty)
//! GET  /v1/{kind}/{key}/{command}   queries only
//! ```

mod counters;
mod presence;

use axum::http::Method;
use axum::Router;
use tracing::warn;

use crate::actors::{Actor, ActorRegistry};
use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::protocol::{validate_key, WireCommand};
use crate::state::AppState;

/// Create API v1 routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/counters", counters::routes())
        .nest("/presence", presence::routes())
}

/// Decode a named command and route it to the actor for `key`.
async fn run_command<A>(
    registry: &ActorRegistry<A>,
    method: &Method,
    ctx: &RequestContext,
    key: &str,
    command: &str,
    body: &[u8],
) -> Result<A::Reply, ApiError>
where
    A: Actor,
    A::Command: WireCommand,
{
    apply(registry, method, key, command, body).await.map_err(|e| {
        if e.problem.retryable {
            warn!(
                request_id = %ctx.request_id,
                kind = A::KIND,
                key = %key,
                command = %command,
                detail = %e.problem.detail,
                "Command not applied"
            );
        }
        e.with_request_id(ctx.request_id.clone())
    })
}

async fn apply<A>(
    registry: &ActorRegistry<A>,
    method: &Method,
    key: &str,
    command: &str,
    body: &[u8],
) -> Result<A::Reply, ApiError>
where
    A: Actor,
    A::Command: WireCommand,
{
    validate_key(key)?;

    if *method == Method::GET && <A::Command as WireCommand>::is_mutating(command) {
        return Err(ApiError::method_not_allowed(
            "method_not_allowed",
            format!("{command} changes state and must be sent with POST"),
        ));
    }

    let command = <A::Command as WireCommand>::decode(command, body)?;
    registry.dispatch(key, command).await.map_err(ApiError::from)
}

