//! HTTP API integration tests.
//!
//! Drives the full router (routing, decoding, actors, store) in process.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
use axum::Router;
use engage_actor_host::{api, clock::ManualClock, state::AppState};
use engage_testing::{init_tracing, FlakyStore};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Test harness for API tests.
struct ApiTestHarness {
    router: Router,
    state: AppState,
    store: Arc<FlakyStore>,
    clock: Arc<ManualClock>,
}

struct TestResponse {
    status: StatusCode,
    content_type: Option<String>,
    body: Value,
}

impl ApiTestHarness {
    fn new() -> Self {
        init_tracing();
        let store = FlakyStore::new();
        let clock = Arc::new(ManualClock::new(0));
        let state = AppState::with_defaults(store.clone(), clock.clone());
        Self {
            router: api::create_router(state.clone()),
            state,
            store,
            clock,
        }
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        TestResponse {
            status,
            content_type,
            body,
        }
    }

    async fn post(&self, uri: &str, body: &str) -> TestResponse {
        let request = Request::post(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn get(&self, uri: &str) -> TestResponse {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }
}

#[tokio::test]
async fn test_counter_lifecycle() {
    let h = ApiTestHarness::new();

    let res = h.post("/v1/counters/post_1/init", r#"{"likes": 5}"#).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, json!({"ok": true}));

    let res = h.post("/v1/counters/post_1/increment", r#"{"field": "likes"}"#).await;
    assert_eq!(res.body, json!({"ok": true}));
    h.post("/v1/counters/post_1/increment", r#"{"field": "views", "delta": 10}"#)
        .await;

    let res = h.get("/v1/counters/post_1/get").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(
        res.body,
        json!({"likes": 6, "comments": 0, "shares": 0, "views": 10, "saves": 0})
    );

    let res = h.post("/v1/counters/post_1/delete", "").await;
    assert_eq!(res.body, json!({"ok": true}));

    let res = h.post("/v1/counters/post_1/get", "").await;
    assert_eq!(
        res.body,
        json!({"likes": 0, "comments": 0, "shares": 0, "views": 0, "saves": 0})
    );
}

#[tokio::test]
async fn test_decrement_never_goes_negative() {
    let h = ApiTestHarness::new();

    h.post("/v1/counters/post_2/decrement", r#"{"field": "saves"}"#)
        .await;
    h.post("/v1/counters/post_2/increment", r#"{"field": "saves"}"#)
        .await;

    let res = h.get("/v1/counters/post_2/get").await;
    assert_eq!(res.body["saves"], json!(1));
}

#[tokio::test]
async fn test_presence_heartbeat_keeps_viewer_alive() {
    let h = ApiTestHarness::new();

    let res = h
        .post(
            "/v1/presence/live_1/register",
            r#"{"userId": "u1", "sessionId": "s1"}"#,
        )
        .await;
    assert_eq!(res.body, json!({"success": true, "viewerCount": 1}));

    h.clock.set(20_000);
    let res = h
        .post("/v1/presence/live_1/heartbeat", r#"{"sessionId": "s1"}"#)
        .await;
    assert_eq!(res.body, json!({"success": true, "viewerCount": 1}));

    h.clock.set(35_000);
    let res = h.get("/v1/presence/live_1/count").await;
    assert_eq!(
        res.body,
        json!({"count": 1, "viewers": [{"userId": "u1", "lastHeartbeat": 20000}]})
    );

    h.clock.set(50_001);
    let res = h.get("/v1/presence/live_1/count").await;
    assert_eq!(res.body, json!({"count": 0, "viewers": []}));
}

#[tokio::test]
async fn test_presence_deregister() {
    let h = ApiTestHarness::new();

    h.post(
        "/v1/presence/live_2/register",
        r#"{"userId": "u1", "sessionId": "s1"}"#,
    )
    .await;
    h.post(
        "/v1/presence/live_2/register",
        r#"{"userId": "u2", "sessionId": "s2"}"#,
    )
    .await;

    let res = h
        .post("/v1/presence/live_2/deregister", r#"{"sessionId": "s1"}"#)
        .await;
    assert_eq!(res.body, json!({"success": true, "viewerCount": 1}));
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let h = ApiTestHarness::new();

    let request = Request::post("/v1/counters/post_1/increment")
        .header("x-request-id", "req_test_1")
        .body(Body::from("{not json"))
        .unwrap();
    let res = h.send(request).await;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.content_type.as_deref(), Some("application/problem+json"));
    assert_eq!(res.body["code"], json!("invalid_payload"));
    assert_eq!(res.body["request_id"], json!("req_test_1"));
    assert_eq!(res.body["retryable"], json!(false));
}

#[tokio::test]
async fn test_unknown_command_and_route() {
    let h = ApiTestHarness::new();

    let res = h.post("/v1/counters/post_1/reset", "").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["code"], json!("unknown_command"));

    let res = h.post("/v1/bookmarks/post_1/get", "").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["code"], json!("route_not_found"));
}

#[tokio::test]
async fn test_mutation_over_get_is_rejected() {
    let h = ApiTestHarness::new();

    let res = h.get("/v1/counters/post_1/increment").await;
    assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.body["code"], json!("method_not_allowed"));

    // Nothing reached the store
    assert_eq!(h.store.puts(), 0);
}

#[tokio::test]
async fn test_store_outage_is_retryable() {
    let h = ApiTestHarness::new();
    h.post("/v1/counters/post_1/increment", r#"{"field": "likes"}"#)
        .await;

    h.store.fail_writes(true);
    let res = h
        .post("/v1/counters/post_1/increment", r#"{"field": "likes"}"#)
        .await;
    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.body["code"], json!("store_unavailable"));
    assert_eq!(res.body["retryable"], json!(true));

    // The failed increment was not applied
    h.store.fail_writes(false);
    let res = h.get("/v1/counters/post_1/get").await;
    assert_eq!(res.body["likes"], json!(1));
}

#[tokio::test]
async fn test_commands_after_shutdown_are_refused() {
    let h = ApiTestHarness::new();
    h.state.shutdown().await;

    let res = h.get("/v1/presence/live_1/count").await;
    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.body["code"], json!("actor_stopped"));
}

#[tokio::test]
async fn test_readyz_reports_live_actors() {
    let h = ApiTestHarness::new();
    h.get("/v1/counters/a/get").await;
    h.get("/v1/counters/b/get").await;

    let res = h.get("/readyz").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["status"], json!("ok"));
    assert_eq!(res.body["components"]["actors"]["counters"], json!(2));
    assert_eq!(res.body["components"]["actors"]["presence"], json!(0));

    let res = h.get("/livez").await;
    assert_eq!(res.status, StatusCode::OK);
}
