//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an agent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    /// Create a new agent ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Liveness status of an agent as tracked by the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    /// Agent has registered or heartbeated recently
    Online,
    /// Agent is considered gone
    Offline,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Online => write!(f, "Online"),
            AgentStatus::Offline => write!(f, "Offline"),
        }
    }
}

/// The covert transport a channel or listener unit speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    Http,
    Dns,
    Icmp,
    Smb,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Http => write!(f, "http"),
            TransportKind::Dns => write!(f, "dns"),
            TransportKind::Icmp => write!(f, "icmp"),
            TransportKind::Smb => write!(f, "smb"),
        }
    }
}

/// A unit of tasking produced by the controller and consumed exactly once
/// by an agent polling cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Identifier assigned when the command was queued
    pub id: String,
    /// The command payload handed to the executor
    pub payload: String,
}

impl Command {
    /// Create a command with a fresh identifier
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload: payload.into(),
        }
    }
}

/// Result of executing a [`Command`], reported back over a channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// The agent that executed the command
    pub agent_id: AgentId,
    /// Captured output
    pub output: String,
    /// Unix timestamp (seconds) of completion
    pub timestamp: u64,
}

impl CommandResult {
    /// Create a result stamped with the current time
    pub fn new(agent_id: AgentId, output: impl Into<String>) -> Self {
        Self {
            agent_id,
            output: output.into(),
            timestamp: crate::time::unix_time_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_roundtrip() {
        let id = AgentId::new("agent_001");
        assert_eq!(id.as_str(), "agent_001");
        assert_eq!(format!("{}", id), "agent_001");
        assert_eq!(AgentId::from("agent_001"), id);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(format!("{}", AgentStatus::Online), "Online");
        assert_eq!(format!("{}", AgentStatus::Offline), "Offline");
    }

    #[test]
    fn test_transport_kind_display() {
        assert_eq!(format!("{}", TransportKind::Http), "http");
        assert_eq!(format!("{}", TransportKind::Smb), "smb");
    }

    #[test]
    fn test_command_ids_are_unique() {
        let a = Command::new("whoami");
        let b = Command::new("whoami");
        assert_ne!(a.id, b.id);
        assert_eq!(a.payload, b.payload);
    }
}
