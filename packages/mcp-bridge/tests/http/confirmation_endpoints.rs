// The deferred-confirmation workflow over HTTP, against a medium-risk stub.
include!("../common/http.rs");

async fn defer_tool_call(app: &axum::Router) -> Value {
    let (status, payload) = send_json(
        app,
        Method::POST,
        "/servers/echo/tools/foo",
        Some(json!({"a": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "deferral: {payload}");
    payload
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn medium_risk_tool_call_is_deferred_then_committed() {
    if !python3_available() {
        eprintln!("skipping: python3 not found");
        return;
    }
    let app = TestApp::new();
    start_stub_server(&app.app, "echo", Some(2)).await;

    let deferral = defer_tool_call(&app.app).await;
    assert_eq!(deferral["requires_confirmation"], true);
    assert_eq!(deferral["risk_level"], 2);
    assert_eq!(deferral["server_id"], "echo");
    assert_eq!(deferral["method"], "tools/call");
    assert_eq!(deferral["tool_name"], "foo");
    assert!(deferral["expires_at"].as_str().unwrap().contains('T'));
    let confirmation_id = deferral["confirmation_id"].as_str().unwrap();

    let (status, payload) = send_json(
        &app.app,
        Method::POST,
        &format!("/confirmations/{confirmation_id}"),
        Some(json!({"confirm": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "commit: {payload}");
    assert_eq!(payload, json!({"echoed": {"name": "foo", "arguments": {"a": 1}}}));

    // The handle was consumed by the commit.
    let (status, _) = send_json(
        &app.app,
        Method::POST,
        &format!("/confirmations/{confirmation_id}"),
        Some(json!({"confirm": true})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_confirmation_is_single_shot() {
    if !python3_available() {
        eprintln!("skipping: python3 not found");
        return;
    }
    let app = TestApp::new();
    start_stub_server(&app.app, "echo", Some(2)).await;

    let deferral = defer_tool_call(&app.app).await;
    let confirmation_id = deferral["confirmation_id"].as_str().unwrap();

    let (status, payload) = send_json(
        &app.app,
        Method::POST,
        &format!("/confirmations/{confirmation_id}"),
        Some(json!({"confirm": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["status"], "rejected");
    assert!(payload["message"].as_str().unwrap().contains("foo"));

    let (status, _) = send_json(
        &app.app,
        Method::POST,
        &format!("/confirmations/{confirmation_id}"),
        Some(json!({"confirm": false})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_handle_is_not_found() {
    let app = TestApp::new();
    let (status, payload) = send_json(
        &app.app,
        Method::POST,
        "/confirmations/no-such-handle",
        Some(json!({"confirm": true})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(payload["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn confirmation_body_is_required() {
    let app = TestApp::new();
    let (status, _) = send_json(
        &app.app,
        Method::POST,
        "/confirmations/whatever",
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn listing_methods_are_not_deferred_on_medium_risk() {
    if !python3_available() {
        eprintln!("skipping: python3 not found");
        return;
    }
    let app = TestApp::new();
    start_stub_server(&app.app, "echo", Some(2)).await;

    let (status, payload) =
        send_json(&app.app, Method::GET, "/servers/echo/tools", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(payload.get("requires_confirmation").is_none());
    assert_eq!(payload["tools"][0]["name"], "echo");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn committing_against_a_dead_server_fails_cleanly() {
    if !python3_available() {
        eprintln!("skipping: python3 not found");
        return;
    }
    let app = TestApp::new();
    start_stub_server(&app.app, "echo", Some(2)).await;

    let deferral = defer_tool_call(&app.app).await;
    let confirmation_id = deferral["confirmation_id"].as_str().unwrap();

    let (status, _) = send_json(&app.app, Method::DELETE, "/servers/echo", None).await;
    assert_eq!(status, StatusCode::OK);

    // The ledger only holds the identifier, so the replay fails with the
    // registry's not-found error rather than dangling.
    let (status, payload) = send_json(
        &app.app,
        Method::POST,
        &format!("/confirmations/{confirmation_id}"),
        Some(json!({"confirm": true})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(payload["error"]
        .as_str()
        .unwrap()
        .contains("not found or not connected"));
}
