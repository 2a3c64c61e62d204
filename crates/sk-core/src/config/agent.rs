//! Agent configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the agent binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Unique identifier for this agent
    pub agent_id: String,

    /// Authentication token issued by the controller.
    ///
    /// Absent on first run; the agent registers over HTTP, then persists the
    /// issued token back here. The token never rotates once issued.
    pub auth_token: Option<String>,

    /// Seconds between command polling cycles
    pub poll_interval_secs: u64,

    /// Seconds between heartbeats
    pub heartbeat_interval_secs: u64,

    /// Per-transport channel configuration
    pub channels: ChannelsConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_id: String::new(),
            auth_token: None,
            poll_interval_secs: 10,
            heartbeat_interval_secs: 30,
            channels: ChannelsConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Polling interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Heartbeat interval as a [`Duration`]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// Enablement flags and endpoints for each covert channel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub http: HttpChannelConfig,
    pub dns: DnsChannelConfig,
    pub icmp: IcmpChannelConfig,
    pub smb: SmbChannelConfig,
}

/// HTTP channel endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpChannelConfig {
    pub enabled: bool,
    /// Base URL of the controller, e.g. `http://controller.example:80`
    pub server_url: String,
}

impl Default for HttpChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: "http://127.0.0.1:80".to_string(),
        }
    }
}

/// DNS channel endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsChannelConfig {
    pub enabled: bool,
    /// IP address of the controller's DNS responder
    pub server_ip: String,
    /// Domain suffix appended to every query name
    pub domain_suffix: String,
}

impl Default for DnsChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_ip: "127.0.0.1".to_string(),
            domain_suffix: "c2domain.com".to_string(),
        }
    }
}

/// ICMP channel endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IcmpChannelConfig {
    pub enabled: bool,
    /// IP address echo requests are sent to
    pub target_ip: String,
}

impl Default for IcmpChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target_ip: "127.0.0.1".to_string(),
        }
    }
}

/// SMB channel endpoint.
///
/// The share is consumed through its mounted path; SMB framing itself is
/// handled by the host's SMB client, not by this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmbChannelConfig {
    pub enabled: bool,
    /// Path where the TASKS share is mounted
    pub share_path: String,
    /// Fixed task filename inside the share
    pub task_file: String,
}

impl Default for SmbChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            share_path: "/mnt/tasks".to_string(),
            task_file: "task.txt".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_disable_all_channels() {
        let config = AgentConfig::default();
        assert!(!config.channels.http.enabled);
        assert!(!config.channels.dns.enabled);
        assert!(!config.channels.icmp.enabled);
        assert!(!config.channels.smb.enabled);
    }

    #[test]
    fn test_intervals() {
        let config = AgentConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AgentConfig = toml::from_str(
            r#"
            agent_id = "agent_001"

            [channels.dns]
            enabled = true
            server_ip = "10.0.0.1"
            "#,
        )
        .unwrap();

        assert_eq!(config.agent_id, "agent_001");
        assert!(config.channels.dns.enabled);
        assert_eq!(config.channels.dns.server_ip, "10.0.0.1");
        assert_eq!(config.channels.dns.domain_suffix, "c2domain.com");
        assert_eq!(config.poll_interval_secs, 10);
    }
}
