//! Counter API endpoints.
//!
//! `/v1/counters/{key}/{command}` with `command` one of `init`, `get`,
//! `increment`, `decrement`, or `delete`.

use axum::{
    extract::{Path, State},
    http::Method,
    routing::get,
    Json, Router,
};
use bytes::Bytes;

use crate::actors::CounterActor;
use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::protocol::CounterReply;
use crate::state::AppState;

/// Create counter routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/{key}/{command}", get(counter_command).post(counter_command))
}

async fn counter_command(
    State(state): State<AppState>,
    method: Method,
    ctx: RequestContext,
    Path((key, command)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<CounterReply>, ApiError> {
    super::run_command::<CounterActor>(state.counters(), &method, &ctx, &key, &command, &body)
        .await
        .map(Json)
}
