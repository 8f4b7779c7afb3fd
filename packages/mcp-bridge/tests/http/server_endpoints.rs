// Server lifecycle endpoints: create, list, delete, health.
include!("../common/http.rs");

fn cat_server_body(id: &str) -> Value {
    json!({"id": id, "command": "/bin/cat"})
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn create_list_delete_lifecycle() {
    let app = TestApp::new();

    let (status, created) =
        send_json(&app.app, Method::POST, "/servers", Some(cat_server_body("echo"))).await;
    assert_eq!(status, StatusCode::CREATED, "create: {created}");
    assert_eq!(created["id"], "echo");
    assert_eq!(created["status"], "connected");
    assert!(created["pid"].as_u64().unwrap() > 0);
    // No risk class configured, so no risk fields on the wire.
    assert!(created.get("risk_level").is_none());
    assert!(created.get("running_in_docker").is_none());

    let (status, listed) = send_json(&app.app, Method::GET, "/servers", None).await;
    assert_eq!(status, StatusCode::OK);
    let servers = listed["servers"].as_array().unwrap();
    let matching: Vec<_> = servers
        .iter()
        .filter(|server| server["id"] == "echo")
        .collect();
    assert_eq!(matching.len(), 1, "exactly one record per identifier");
    assert_eq!(matching[0]["connected"], true);

    let (status, deleted) =
        send_json(&app.app, Method::DELETE, "/servers/echo", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["status"], "disconnected");

    let (status, listed) = send_json(&app.app, Method::GET, "/servers", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(listed["servers"]
        .as_array()
        .unwrap()
        .iter()
        .all(|server| server["id"] != "echo"));

    let (status, payload) = send_json(&app.app, Method::DELETE, "/servers/echo", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(payload["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_identifier_returns_conflict() {
    let app = TestApp::new();

    let (status, _) =
        send_json(&app.app, Method::POST, "/servers", Some(cat_server_body("twice"))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, payload) =
        send_json(&app.app, Method::POST, "/servers", Some(cat_server_body("twice"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(payload["error"].as_str().unwrap().contains("already exists"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_fields_are_rejected() {
    let app = TestApp::new();

    let (status, payload) = send_json(&app.app, Method::POST, "/servers", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(payload["error"].as_str().unwrap().contains("id and command"));

    let (status, _) =
        send_json(&app.app, Method::POST, "/servers", Some(json!({"id": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn out_of_range_risk_level_is_rejected() {
    let app = TestApp::new();
    let (status, payload) = send_json(
        &app.app,
        Method::POST,
        "/servers",
        Some(json!({"id": "x", "command": "/bin/cat", "riskLevel": 4})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(payload["error"].as_str().unwrap().contains("risk level"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn high_risk_requires_a_docker_image() {
    let app = TestApp::new();
    let (status, payload) = send_json(
        &app.app,
        Method::POST,
        "/servers",
        Some(json!({"id": "x", "command": "/bin/cat", "riskLevel": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(payload["error"].as_str().unwrap().contains("Docker"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn spawn_failure_returns_500_and_registers_nothing() {
    let app = TestApp::new();
    let (status, payload) = send_json(
        &app.app,
        Method::POST,
        "/servers",
        Some(json!({"id": "broken", "command": "/nonexistent/mcp-server"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(payload["error"].as_str().unwrap().contains("Failed to start"));

    let (_, listed) = send_json(&app.app, Method::GET, "/servers", None).await;
    assert!(listed["servers"].as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn risk_fields_appear_only_when_configured() {
    let app = TestApp::new();

    let mut body = cat_server_body("careful");
    body["riskLevel"] = json!(1);
    let (status, created) = send_json(&app.app, Method::POST, "/servers", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["risk_level"], 1);
    assert_eq!(created["risk_description"], "Low risk - standard execution");
    assert_eq!(created["running_in_docker"], false);

    let (_, listed) = send_json(&app.app, Method::GET, "/servers", None).await;
    let server = &listed["servers"].as_array().unwrap()[0];
    assert_eq!(server["risk_level"], 1);
    assert_eq!(server["running_in_docker"], false);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_reports_the_fleet() {
    let app = TestApp::new();

    let (status, health) = send_json(&app.app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["serverCount"], 0);
    assert!(health["uptime"].as_f64().unwrap() >= 0.0);

    send_json(&app.app, Method::POST, "/servers", Some(cat_server_body("a"))).await;
    send_json(&app.app, Method::POST, "/servers", Some(cat_server_body("b"))).await;

    let (_, health) = send_json(&app.app, Method::GET, "/health", None).await;
    assert_eq!(health["serverCount"], 2);
    assert_eq!(health["servers"].as_array().unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn root_and_fallback_are_informative() {
    let app = TestApp::new();

    let (status, _) = send_json(&app.app, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send_json(&app.app, Method::GET, "/nope/nothing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
