//! Admin control surface
//!
//! Operator-facing HTTP API: listener lifecycle control, agent directory
//! management, and tasking. Served independently of the listener units so
//! the controller can be driven while transports are stopped.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use sk_core::error::ControlError;
use sk_core::types::{AgentId, Command};

use crate::state::ControllerState;

/// Build the admin router
pub fn admin_router(state: ControllerState) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/config", get(show_config))
        .route("/api/control/:action", post(control))
        .route("/api/agent/register", post(register_agent))
        .route("/api/agent/authenticate", post(authenticate_agent))
        .route("/api/agent/list", get(list_agents))
        .route("/api/agent/task", post(enqueue_task))
        .route("/api/agent/results", get(agent_results))
        .with_state(state)
}

/// Serve the admin API until the shutdown signal fires
pub async fn serve(
    bind_addr: String,
    state: ControllerState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Admin API listening");

    axum::serve(
        listener,
        admin_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(cancel.cancelled_owned())
    .await?;
    Ok(())
}

async fn status(State(state): State<ControllerState>) -> Json<serde_json::Value> {
    Json(json!({ "running": state.orchestrator.is_running() }))
}

async fn show_config(State(state): State<ControllerState>) -> Json<sk_core::config::ControllerConfig> {
    Json(state.config.clone())
}

async fn control(
    State(state): State<ControllerState>,
    Path(action): Path<String>,
) -> Response {
    let result = match action.as_str() {
        "start" => state.orchestrator.start_all().await,
        "stop" => state.orchestrator.stop_all().await,
        "restart" => state.orchestrator.restart().await,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "detail": "Invalid action" })),
            )
                .into_response();
        }
    };

    match result {
        Ok(()) => {
            let mut label = action;
            if let Some(first) = label.get_mut(..1) {
                first.make_ascii_uppercase();
            }
            Json(json!({ "message": format!("{label} triggered successfully!") })).into_response()
        }
        Err(ControlError::TransitionInFlight) => (
            StatusCode::CONFLICT,
            Json(json!({ "detail": "Another control action is in progress" })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Control action failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": "Control action failed" })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    agent_id: String,
}

async fn register_agent(
    State(state): State<ControllerState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<RegisterRequest>,
) -> Response {
    let ip_address = connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let agent_id = AgentId::new(request.agent_id);
    match state.directory.register(&agent_id, &ip_address).await {
        Ok(token) => Json(json!({ "auth_token": token })).into_response(),
        Err(e) => {
            tracing::error!(agent_id = %agent_id, "Agent registration failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": "Registration failed" })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthRequest {
    agent_id: String,
    auth_token: String,
}

async fn authenticate_agent(
    State(state): State<ControllerState>,
    Json(request): Json<AuthRequest>,
) -> Response {
    let agent_id = AgentId::new(request.agent_id);
    if state
        .directory
        .authenticate(&agent_id, &request.auth_token)
        .await
    {
        Json(json!({ "message": "Authenticated" })).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Authentication failed" })),
        )
            .into_response()
    }
}

async fn list_agents(State(state): State<ControllerState>) -> Json<serde_json::Value> {
    let agents = state.directory.list().await;
    Json(json!({ "agents": agents }))
}

#[derive(Debug, Deserialize)]
struct TaskRequest {
    agent_id: String,
    payload: String,
}

async fn enqueue_task(
    State(state): State<ControllerState>,
    Json(request): Json<TaskRequest>,
) -> Json<serde_json::Value> {
    let agent_id = AgentId::new(request.agent_id);
    let command = Command::new(request.payload);
    let command_id = command.id.clone();
    state.queue.push(&agent_id, command);
    tracing::info!(agent_id = %agent_id, command_id = %command_id, "Task queued");
    Json(json!({ "command_id": command_id }))
}

#[derive(Debug, Deserialize)]
struct ResultsQuery {
    agent_id: String,
}

async fn agent_results(
    State(state): State<ControllerState>,
    Query(query): Query<ResultsQuery>,
) -> Json<serde_json::Value> {
    let agent_id = AgentId::new(query.agent_id);
    let results = state.queue.results_for(&agent_id);
    Json(json!({ "results": results }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::directory::AgentDirectory;
    use crate::orchestrator::ListenerOrchestrator;
    use crate::queue::TaskQueue;
    use sk_core::config::ControllerConfig;

    fn test_state(dir: &tempfile::TempDir) -> ControllerState {
        let mut config = ControllerConfig::default();
        config.directory_path = dir.path().join("agents.json");
        config.transports.http_enabled = true;
        config.transports.http_bind = "127.0.0.1:0".to_string();
        config.transports.dns_enabled = false;

        let directory =
            Arc::new(AgentDirectory::open(dir.path().join("agents.json")).unwrap());
        let queue = Arc::new(TaskQueue::new());
        let orchestrator = Arc::new(ListenerOrchestrator::new(
            config.clone(),
            Arc::clone(&directory),
            Arc::clone(&queue),
        ));
        ControllerState {
            config,
            directory,
            queue,
            orchestrator,
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_status_reflects_orchestrator() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let router = admin_router(state.clone());

        let response = router
            .clone()
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await["running"], false);

        state.orchestrator.start_all().await.unwrap();
        let response = router
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await["running"], true);

        state.orchestrator.stop_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_control_action_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let router = admin_router(test_state(&dir));

        let response = router
            .oneshot(post_json("/api/control/reboot", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_control_start_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let router = admin_router(state.clone());

        let response = router
            .clone()
            .oneshot(post_json("/api/control/start", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await["message"],
            "Start triggered successfully!"
        );
        assert!(state.orchestrator.is_running());

        let response = router
            .oneshot(post_json("/api/control/stop", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!state.orchestrator.is_running());
    }

    #[tokio::test]
    async fn test_register_and_authenticate() {
        let dir = tempfile::tempdir().unwrap();
        let router = admin_router(test_state(&dir));

        let response = router
            .clone()
            .oneshot(post_json(
                "/api/agent/register",
                json!({ "agent_id": "agent_007" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let token = body_json(response).await["auth_token"]
            .as_str()
            .unwrap()
            .to_string();

        let response = router
            .clone()
            .oneshot(post_json(
                "/api/agent/authenticate",
                json!({ "agent_id": "agent_007", "auth_token": token }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(post_json(
                "/api/agent/authenticate",
                json!({ "agent_id": "agent_007", "auth_token": "wrong" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_agents() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let router = admin_router(state.clone());

        state
            .directory
            .register(&AgentId::new("agent_a"), "10.0.0.1")
            .await
            .unwrap();

        let response = router
            .oneshot(Request::get("/api/agent/list").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["agents"].as_array().unwrap().len(), 1);
        assert_eq!(body["agents"][0]["agent_id"], "agent_a");
    }

    #[tokio::test]
    async fn test_task_enqueue_and_results() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let router = admin_router(state.clone());

        let response = router
            .clone()
            .oneshot(post_json(
                "/api/agent/task",
                json!({ "agent_id": "agent_b", "payload": "whoami" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.queue.pending_len(&AgentId::new("agent_b")), 1);

        state.queue.record_result(sk_core::types::CommandResult::new(
            AgentId::new("agent_b"),
            "Executed: whoami",
        ));

        let response = router
            .oneshot(
                Request::get("/api/agent/results?agent_id=agent_b")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["results"][0]["output"], "Executed: whoami");
    }
}
