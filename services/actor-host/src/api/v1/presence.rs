//! Presence API endpoints.
//!
//! `/v1/presence/{key}/{command}` with `command` one of `register`,
//! `heartbeat`, `deregister`, or `count`.

use axum::{
    extract::{Path, State},
    http::Method,
    routing::get,
    Json, Router,
};
use bytes::Bytes;

use crate::actors::PresenceActor;
use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::protocol::PresenceReply;
use crate::state::AppState;

/// Create presence routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/{key}/{command}", get(presence_command).post(presence_command))
}

async fn presence_command(
    State(state): State<AppState>,
    method: Method,
    ctx: RequestContext,
    Path((key, command)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<PresenceReply>, ApiError> {
    super::run_command::<PresenceActor>(state.presence(), &method, &ctx, &key, &command, &body)
        .await
        .map(Json)
}
