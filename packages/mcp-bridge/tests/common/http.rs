// Shared helpers for the HTTP integration tests. Pulled in with include!()
// by each test target under tests/http/.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use mcp_bridge::router::{build_router_with_state, AppState};
use mcp_bridge::rpc::Bridge;
use mcp_bridge::supervisor::Supervisor;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    app: axum::Router,
    #[allow(dead_code)]
    state: Arc<AppState>,
}

impl TestApp {
    fn new() -> Self {
        let state = AppState::new(Bridge::new(Supervisor::new()));
        let (app, state) = build_router_with_state(Arc::new(state));
        Self { app, state }
    }
}

async fn send_json(
    app: &axum::Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let payload = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, payload)
}

#[allow(dead_code)]
fn stub_fixture_path() -> String {
    concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/stub_server.py").to_string()
}

/// The stub fixture needs a python3 on PATH; tests that depend on it bail
/// out quietly on hosts without one.
#[allow(dead_code)]
fn python3_available() -> bool {
    which::which("python3").is_ok()
}

#[allow(dead_code)]
fn stub_server_body(id: &str, risk_level: Option<u8>) -> Value {
    let mut body = json!({
        "id": id,
        "command": "python3",
        "args": [stub_fixture_path()],
    });
    if let Some(level) = risk_level {
        body["riskLevel"] = json!(level);
    }
    body
}

#[allow(dead_code)]
async fn start_stub_server(app: &axum::Router, id: &str, risk_level: Option<u8>) {
    let (status, payload) = send_json(
        app,
        Method::POST,
        "/servers",
        Some(stub_server_body(id, risk_level)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "stub server start: {payload}");
}
