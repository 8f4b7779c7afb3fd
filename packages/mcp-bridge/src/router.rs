//! The HTTP surface of the bridge.
//!
//! Every route translates into a registry, ledger or correlation-engine
//! call; bodies are JSON in both directions and error responses carry a
//! single `error` field.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{Request as HttpRequest, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Json;
use axum::Router;
use mcp_bridge_error::{BridgeError, ErrorBody};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::Span;
use utoipa::{OpenApi, ToSchema};

use crate::config::{DockerConfig, RiskLevel, ServerConfig};
use crate::protocol::methods;
use crate::rpc::Bridge;
use crate::supervisor::ServerSnapshot;

#[derive(Debug)]
pub struct AppState {
    bridge: Bridge,
    started_at: Instant,
}

impl AppState {
    pub fn new(bridge: Bridge) -> Self {
        Self {
            bridge,
            started_at: Instant::now(),
        }
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }
}

pub fn build_router(state: AppState) -> Router {
    build_router_with_state(Arc::new(state)).0
}

pub fn build_router_with_state(shared: Arc<AppState>) -> (Router, Arc<AppState>) {
    let mut router = Router::new()
        .route("/", get(get_root))
        .route("/health", get(get_health))
        .route("/servers", get(list_servers).post(create_server))
        .route("/servers/:id", delete(delete_server))
        .route("/servers/:id/tools", get(list_tools))
        .route("/servers/:id/tools/:name", post(call_tool))
        .route("/servers/:id/resources", get(list_resources))
        .route("/servers/:id/resources/:uri", get(read_resource))
        .route("/servers/:id/prompts", get(list_prompts))
        .route("/servers/:id/prompts/:name", post(get_prompt))
        .route("/confirmations/:confirmation_id", post(resolve_confirmation))
        .fallback(not_found)
        .with_state(shared.clone());

    let http_logging = match std::env::var("MCP_BRIDGE_LOG_HTTP") {
        Ok(value) if value == "0" || value.eq_ignore_ascii_case("false") => false,
        _ => true,
    };
    if http_logging {
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|req: &HttpRequest<_>| {
                tracing::info_span!(
                    "http.request",
                    method = %req.method(),
                    uri = %req.uri()
                )
            })
            .on_response(|res: &Response<_>, latency: Duration, span: &Span| {
                tracing::info!(
                    parent: span,
                    status = %res.status(),
                    latency_ms = latency.as_millis()
                );
            });
        router = router.layer(trace_layer);
    }

    (router, shared)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        get_health,
        list_servers,
        create_server,
        delete_server,
        list_tools,
        call_tool,
        list_resources,
        read_resource,
        list_prompts,
        get_prompt,
        resolve_confirmation
    ),
    components(
        schemas(
            ServerInfo,
            ServerListResponse,
            CreateServerRequest,
            CreateServerResponse,
            DeleteServerResponse,
            ConfirmationRequest,
            HealthResponse,
            ServerConfig,
            DockerConfig,
            ErrorBody
        )
    ),
    tags(
        (name = "meta", description = "Service metadata"),
        (name = "servers", description = "Server lifecycle"),
        (name = "invoke", description = "Tool, resource and prompt invocation"),
        (name = "confirmations", description = "Deferred-confirmation workflow")
    )
)]
pub struct ApiDoc;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Bridge(err) = &self;
        let status = StatusCode::from_u16(err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(err.to_error_body())).into_response()
    }
}

/// One row of `GET /servers` and of the health report.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct ServerInfo {
    pub id: String,
    pub connected: bool,
    pub pid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_in_docker: Option<bool>,
}

impl From<ServerSnapshot> for ServerInfo {
    fn from(snapshot: ServerSnapshot) -> Self {
        let risk_level = snapshot.risk_level;
        ServerInfo {
            id: snapshot.id,
            connected: true,
            pid: snapshot.pid,
            risk_level: risk_level.map(RiskLevel::as_int),
            risk_description: risk_level.map(|level| level.description().to_string()),
            running_in_docker: risk_level.map(|_| snapshot.running_in_docker),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct ServerListResponse {
    pub servers: Vec<ServerInfo>,
}

/// Body of `POST /servers`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct CreateServerRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: std::collections::BTreeMap<String, String>,
    #[serde(default, rename = "riskLevel")]
    #[schema(value_type = Option<u8>)]
    #[schemars(with = "Option<u8>")]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub docker: Option<DockerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct CreateServerResponse {
    pub id: String,
    pub status: String,
    pub pid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_in_docker: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct DeleteServerResponse {
    pub status: String,
}

/// Body of `POST /confirmations/{confirmation_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct ConfirmationRequest {
    pub confirm: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct HealthResponse {
    pub status: String,
    /// Seconds since the bridge started.
    pub uptime: f64,
    #[serde(rename = "serverCount")]
    pub server_count: usize,
    pub servers: Vec<ServerInfo>,
}

const SERVER_INFO: &str = "\
This is an MCP Bridge server. Available endpoints:\n\
  - GET  /health            - Health check\n\
  - GET  /servers           - List running MCP servers\n\
  - POST /servers           - Start an MCP server\n\n\
Tools, resources and prompts live under /servers/{id}/.";

async fn get_root() -> &'static str {
    SERVER_INFO
}

async fn not_found() -> (StatusCode, String) {
    (
        StatusCode::NOT_FOUND,
        format!("404 Not Found\n\n{SERVER_INFO}"),
    )
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Bridge is healthy", body = HealthResponse)),
    tag = "meta"
)]
/// Health Check
///
/// Reports uptime and the set of connected servers.
async fn get_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let servers: Vec<ServerInfo> = state
        .bridge
        .supervisor
        .list()
        .await
        .into_iter()
        .map(ServerInfo::from)
        .collect();
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime: state.started_at.elapsed().as_secs_f64(),
        server_count: servers.len(),
        servers,
    })
}

#[utoipa::path(
    get,
    path = "/servers",
    responses((status = 200, description = "Connected servers", body = ServerListResponse)),
    tag = "servers"
)]
/// List Servers
///
/// Returns every registered server with its pid and risk class.
async fn list_servers(State(state): State<Arc<AppState>>) -> Json<ServerListResponse> {
    let servers = state
        .bridge
        .supervisor
        .list()
        .await
        .into_iter()
        .map(ServerInfo::from)
        .collect();
    Json(ServerListResponse { servers })
}

#[utoipa::path(
    post,
    path = "/servers",
    request_body = CreateServerRequest,
    responses(
        (status = 201, description = "Server started", body = CreateServerResponse),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 409, description = "Identifier already taken", body = ErrorBody),
        (status = 500, description = "Spawn failure", body = ErrorBody)
    ),
    tag = "servers"
)]
/// Start Server
///
/// Resolves the command, spawns the child and registers it.
async fn create_server(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<CreateServerResponse>), ApiError> {
    let request: CreateServerRequest = parse_body(&body)?;
    if request.id.is_empty() || request.command.is_empty() {
        return Err(BridgeError::InvalidRequest {
            message: "Missing required fields: id and command".to_string(),
        }
        .into());
    }
    if request.risk_level == Some(RiskLevel::High)
        && !request
            .docker
            .as_ref()
            .is_some_and(|docker| !docker.image.is_empty())
    {
        return Err(BridgeError::InvalidRequest {
            message: "Docker configuration with an image is required for high risk level"
                .to_string(),
        }
        .into());
    }

    let spec = ServerConfig {
        command: request.command,
        args: request.args,
        env: request.env,
        risk_level: request.risk_level,
        docker: request.docker,
    };
    let snapshot = state.bridge.supervisor.start(&request.id, &spec).await?;
    let info = ServerInfo::from(snapshot);
    Ok((
        StatusCode::CREATED,
        Json(CreateServerResponse {
            id: info.id,
            status: "connected".to_string(),
            pid: info.pid,
            risk_level: info.risk_level,
            risk_description: info.risk_description,
            running_in_docker: info.running_in_docker,
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/servers/{id}",
    params(("id" = String, Path, description = "Server id")),
    responses(
        (status = 200, description = "Server disconnected", body = DeleteServerResponse),
        (status = 404, description = "Unknown server", body = ErrorBody),
        (status = 500, description = "Kill failure", body = ErrorBody)
    ),
    tag = "servers"
)]
/// Stop Server
///
/// Signals the child to terminate and removes it from the registry.
async fn delete_server(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteServerResponse>, ApiError> {
    state.bridge.supervisor.stop(&id).await?;
    Ok(Json(DeleteServerResponse {
        status: "disconnected".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/servers/{id}/tools",
    params(("id" = String, Path, description = "Server id")),
    responses(
        (status = 200, description = "The server's tools/list result"),
        (status = 404, description = "Unknown server", body = ErrorBody),
        (status = 500, description = "Upstream failure", body = ErrorBody)
    ),
    tag = "invoke"
)]
/// List Tools
///
/// Passes through the child's `tools/list` result.
async fn list_tools(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let result = state
        .bridge
        .call(&id, methods::TOOLS_LIST, json!({}), None)
        .await?;
    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/servers/{id}/tools/{name}",
    params(
        ("id" = String, Path, description = "Server id"),
        ("name" = String, Path, description = "Tool name")
    ),
    responses(
        (status = 200, description = "The tool result, or a deferral response for medium-risk servers"),
        (status = 404, description = "Unknown server", body = ErrorBody),
        (status = 500, description = "Upstream failure", body = ErrorBody)
    ),
    tag = "invoke"
)]
/// Call Tool
///
/// Invokes `tools/call` with the request body as the tool's arguments.
async fn call_tool(
    State(state): State<Arc<AppState>>,
    Path((id, name)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let arguments: Value = parse_optional_body(&body)?;
    let params = json!({"name": name, "arguments": arguments});
    let result = state
        .bridge
        .call(&id, methods::TOOLS_CALL, params, None)
        .await?;
    Ok(Json(result))
}

#[utoipa::path(
    get,
    path = "/servers/{id}/resources",
    params(("id" = String, Path, description = "Server id")),
    responses(
        (status = 200, description = "The server's resources/list result"),
        (status = 404, description = "Unknown server", body = ErrorBody),
        (status = 500, description = "Upstream failure", body = ErrorBody)
    ),
    tag = "invoke"
)]
/// List Resources
///
/// Passes through the child's `resources/list` result.
async fn list_resources(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let result = state
        .bridge
        .call(&id, methods::RESOURCES_LIST, json!({}), None)
        .await?;
    Ok(Json(result))
}

#[utoipa::path(
    get,
    path = "/servers/{id}/resources/{uri}",
    params(
        ("id" = String, Path, description = "Server id"),
        ("uri" = String, Path, description = "Percent-encoded resource URI")
    ),
    responses(
        (status = 200, description = "The server's resources/read result"),
        (status = 404, description = "Unknown server", body = ErrorBody),
        (status = 500, description = "Upstream failure", body = ErrorBody)
    ),
    tag = "invoke"
)]
/// Read Resource
///
/// Invokes `resources/read` with the decoded URI.
async fn read_resource(
    State(state): State<Arc<AppState>>,
    Path((id, uri)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let result = state
        .bridge
        .call(&id, methods::RESOURCES_READ, json!({"uri": uri}), None)
        .await?;
    Ok(Json(result))
}

#[utoipa::path(
    get,
    path = "/servers/{id}/prompts",
    params(("id" = String, Path, description = "Server id")),
    responses(
        (status = 200, description = "The server's prompts/list result"),
        (status = 404, description = "Unknown server", body = ErrorBody),
        (status = 500, description = "Upstream failure", body = ErrorBody)
    ),
    tag = "invoke"
)]
/// List Prompts
///
/// Passes through the child's `prompts/list` result.
async fn list_prompts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let result = state
        .bridge
        .call(&id, methods::PROMPTS_LIST, json!({}), None)
        .await?;
    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/servers/{id}/prompts/{name}",
    params(
        ("id" = String, Path, description = "Server id"),
        ("name" = String, Path, description = "Prompt name")
    ),
    responses(
        (status = 200, description = "The server's prompts/get result"),
        (status = 404, description = "Unknown server", body = ErrorBody),
        (status = 500, description = "Upstream failure", body = ErrorBody)
    ),
    tag = "invoke"
)]
/// Get Prompt
///
/// Invokes `prompts/get` with the request body as the prompt's arguments.
async fn get_prompt(
    State(state): State<Arc<AppState>>,
    Path((id, name)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let arguments: Value = parse_optional_body(&body)?;
    let params = json!({"name": name, "arguments": arguments});
    let result = state
        .bridge
        .call(&id, methods::PROMPTS_GET, params, None)
        .await?;
    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/confirmations/{confirmation_id}",
    request_body = ConfirmationRequest,
    params(("confirmation_id" = String, Path, description = "Confirmation handle")),
    responses(
        (status = 200, description = "The replayed invocation's result, or a rejection acknowledgement"),
        (status = 404, description = "Unknown handle", body = ErrorBody),
        (status = 410, description = "Handle expired", body = ErrorBody),
        (status = 500, description = "Replay failure", body = ErrorBody)
    ),
    tag = "confirmations"
)]
/// Resolve Confirmation
///
/// Commits or abandons a deferred invocation.
async fn resolve_confirmation(
    State(state): State<Arc<AppState>>,
    Path(confirmation_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: ConfirmationRequest = parse_body(&body)?;
    let result = state
        .bridge
        .resolve_confirmation(&confirmation_id, request.confirm)
        .await?;
    Ok(Json(result))
}

/// Deserialize a required JSON body, mapping failures onto the bridge's
/// error contract instead of axum's default rejection.
fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|err| {
            BridgeError::InvalidRequest {
                message: format!("Invalid request body: {err}"),
            }
            .into()
        })
}

/// Arbitrary-JSON bodies (tool and prompt arguments) default to `{}` when
/// the body is empty.
fn parse_optional_body(body: &Bytes) -> Result<Value, ApiError> {
    if body.is_empty() {
        return Ok(json!({}));
    }
    parse_body(body)
}
