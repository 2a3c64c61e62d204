//! HTTP listener unit
//!
//! The agent-facing REST surface: registration, authentication, command
//! polling, output reporting, generic messages, and heartbeats. Identity
//! (`agent_id`, `auth_token`) rides on every request and is checked against
//! the directory before any tasking is released.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use sk_core::types::{AgentId, AgentStatus, CommandResult};

use crate::directory::AgentDirectory;
use crate::queue::TaskQueue;

/// Shared state for the agent API
pub struct AgentApiState {
    pub directory: Arc<AgentDirectory>,
    pub queue: Arc<TaskQueue>,
}

/// Build the agent-facing router
pub fn agent_router(state: Arc<AgentApiState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/agent/register", post(register))
        .route("/api/agent/authenticate", post(authenticate))
        .route("/api/agent/commands", get(commands))
        .route("/api/agent/output", post(output))
        .route("/api/agent/message", post(message))
        .route("/api/agent/heartbeat", post(heartbeat))
        .with_state(state)
}

/// Run the HTTP unit until cancelled.
///
/// Binds inside the unit so a port conflict aborts this unit alone.
pub async fn serve(bind_addr: String, state: Arc<AgentApiState>, cancel: CancellationToken) {
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("HTTP listener failed to bind {}: {}", bind_addr, e);
            return;
        }
    };

    tracing::info!("HTTP listener serving on {}", bind_addr);

    let app = agent_router(state).into_make_service_with_connect_info::<SocketAddr>();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await;

    match result {
        Ok(()) => tracing::info!("HTTP listener stopped"),
        Err(e) => tracing::error!("HTTP listener error: {}", e),
    }
}

async fn root() -> impl IntoResponse {
    Json(json!({"message": "Controller running"}))
}

#[derive(Deserialize)]
struct RegisterRequest {
    agent_id: String,
}

async fn register(
    State(state): State<Arc<AgentApiState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<RegisterRequest>,
) -> impl IntoResponse {
    let ip = connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let agent_id = AgentId::new(request.agent_id);
    match state.directory.register(&agent_id, &ip).await {
        Ok(token) => (StatusCode::OK, Json(json!({"auth_token": token}))),
        Err(e) => {
            tracing::error!(agent_id = %agent_id, "Registration failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": "Registration failed"})),
            )
        }
    }
}

#[derive(Deserialize)]
struct AuthRequest {
    agent_id: String,
    auth_token: String,
}

async fn authenticate(
    State(state): State<Arc<AgentApiState>>,
    Json(request): Json<AuthRequest>,
) -> impl IntoResponse {
    let agent_id = AgentId::new(request.agent_id);
    if state
        .directory
        .authenticate(&agent_id, &request.auth_token)
        .await
    {
        (StatusCode::OK, Json(json!({"message": "Authenticated"})))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Authentication failed"})),
        )
    }
}

#[derive(Deserialize)]
struct IdentityQuery {
    agent_id: String,
    auth_token: String,
}

async fn commands(
    State(state): State<Arc<AgentApiState>>,
    Query(query): Query<IdentityQuery>,
) -> impl IntoResponse {
    let agent_id = AgentId::new(query.agent_id);
    if !state
        .directory
        .authenticate(&agent_id, &query.auth_token)
        .await
    {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Authentication failed"})),
        );
    }

    // Polling doubles as a liveness signal
    if let Err(e) = state
        .directory
        .update_status(&agent_id, AgentStatus::Online)
        .await
    {
        tracing::warn!(agent_id = %agent_id, "Status update failed: {}", e);
    }

    let commands = state.queue.drain(&agent_id);
    (StatusCode::OK, Json(json!({"commands": commands})))
}

#[derive(Deserialize)]
struct OutputRequest {
    agent_id: String,
    auth_token: String,
    output: String,
}

async fn output(
    State(state): State<Arc<AgentApiState>>,
    Json(request): Json<OutputRequest>,
) -> impl IntoResponse {
    let agent_id = AgentId::new(request.agent_id);
    if !state
        .directory
        .authenticate(&agent_id, &request.auth_token)
        .await
    {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Authentication failed"})),
        );
    }

    tracing::info!(agent_id = %agent_id, "Command output received");
    state
        .queue
        .record_result(CommandResult::new(agent_id, request.output));
    (StatusCode::OK, Json(json!({"message": "ok"})))
}

#[derive(Deserialize)]
struct MessageRequest {
    #[allow(dead_code)]
    #[serde(default)]
    agent_id: String,
    message: String,
}

async fn message(Json(request): Json<MessageRequest>) -> impl IntoResponse {
    tracing::info!("Agent message: {}", request.message);
    Json(json!({"response": "ack"}))
}

async fn heartbeat(
    State(state): State<Arc<AgentApiState>>,
    Json(request): Json<AuthRequest>,
) -> impl IntoResponse {
    let agent_id = AgentId::new(request.agent_id);
    if !state
        .directory
        .authenticate(&agent_id, &request.auth_token)
        .await
    {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Authentication failed"})),
        );
    }

    if let Err(e) = state
        .directory
        .update_status(&agent_id, AgentStatus::Online)
        .await
    {
        tracing::warn!(agent_id = %agent_id, "Heartbeat status update failed: {}", e);
    }
    (StatusCode::OK, Json(json!({"message": "ok"})))
}
