//! HTTP mode: streamable MCP at `/mcp`, a health check, and CI webhook
//! intake that routes build logs to `diagnose`.

pub mod webhook;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use tower_http::cors::CorsLayer;

use gitrama_core::{ErrorKind, ToolError};
use gitrama_mcp::GitramaServer;
use webhook::Intake;

// ── Config ──

pub struct ServeConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8765,
        }
    }
}

// ── App State ──

struct AppState {
    server: GitramaServer,
}

// ── Error Handling ──

struct AppError(ToolError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
            ErrorKind::ConfigurationError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::ExternalToolError => StatusCode::BAD_GATEWAY,
        };
        let body = serde_json::json!({ "ok": false, "error": self.0.to_json() });
        (status, Json(body)).into_response()
    }
}

impl From<ToolError> for AppError {
    fn from(err: ToolError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ToolError::validation(rejection.body_text()))
    }
}

type Payload = Result<Json<serde_json::Value>, JsonRejection>;

// ── Entrypoint ──

pub async fn serve(server: GitramaServer, config: ServeConfig) -> anyhow::Result<()> {
    let app = router(server);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "gitrama MCP listening on http://{addr}/mcp");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the router (for testing without binding to a port).
pub fn router(server: GitramaServer) -> Router {
    let factory = server.clone();
    let mcp = StreamableHttpService::new(
        move || Ok(factory.clone()),
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig::default(),
    );
    let state = Arc::new(AppState { server });

    Router::new()
        .nest_service("/mcp", mcp)
        .route("/health", get(health))
        .route("/webhook/failure", post(webhook_failure))
        .route("/webhook/github", post(webhook_github))
        .route("/webhook/jenkins", post(webhook_jenkins))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ok": true,
        "service": "gitrama-mcp",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── Webhooks ──

async fn webhook_failure(
    State(state): State<Arc<AppState>>,
    payload: Payload,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(payload) = payload?;
    route_intake(&state, "failure", webhook::generic(&payload)).await
}

async fn webhook_github(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Payload,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(payload) = payload?;
    let event = headers
        .get("x-github-event")
        .and_then(|v| v.to_str().ok());
    route_intake(&state, "github", webhook::github(event, &payload)).await
}

async fn webhook_jenkins(
    State(state): State<Arc<AppState>>,
    payload: Payload,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(payload) = payload?;
    route_intake(&state, "jenkins", webhook::jenkins(&payload)).await
}

async fn route_intake(
    state: &AppState,
    source: &str,
    intake: Intake,
) -> Result<Json<serde_json::Value>, AppError> {
    match intake {
        Intake::Skip(reason) => {
            tracing::debug!(source, %reason, "webhook ignored");
            Ok(Json(serde_json::json!({ "ok": true, "skipped": reason })))
        }
        Intake::Log(log) => {
            tracing::info!(source, bytes = log.len(), "webhook received");
            let diagnosis = state.server.diagnose(Some(log.as_str())).await?;
            Ok(Json(serde_json::json!({ "ok": true, "diagnosis": diagnosis })))
        }
    }
}
