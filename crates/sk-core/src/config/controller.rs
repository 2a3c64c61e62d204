//! Controller configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the controller daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Per-transport listener configuration
    pub transports: TransportsConfig,

    /// Where the agent directory snapshot is persisted
    pub directory_path: PathBuf,

    /// Admin/control HTTP surface
    pub admin: AdminConfig,

    /// Seconds blocking listener units get to observe cancellation before
    /// the orchestrator abandons them
    pub grace_period_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            transports: TransportsConfig::default(),
            directory_path: super::default_config_dir().join("agents.json"),
            admin: AdminConfig::default(),
            grace_period_secs: 1,
        }
    }
}

impl ControllerConfig {
    /// Shutdown grace period as a [`Duration`]
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

/// Enablement and bind points for the listener units
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportsConfig {
    /// HTTP listener (cooperative)
    pub http_enabled: bool,
    /// Bind address for the HTTP listener, conventionally port 80
    pub http_bind: String,

    /// DNS responder (blocking)
    pub dns_enabled: bool,
    /// Bind address for the DNS responder, conventionally port 53
    pub dns_bind: String,
    /// Fixed IP returned for non-TXT queries
    pub dns_fixed_ip: String,

    /// ICMP sniffer (blocking); no port, requires raw-socket privilege
    pub icmp_enabled: bool,

    /// SMB task mailbox (blocking)
    pub smb_enabled: bool,
    /// Directory exposed as the TASKS share
    pub smb_share_dir: PathBuf,
    /// Fixed task filename inside the share
    pub smb_task_file: String,
}

impl Default for TransportsConfig {
    fn default() -> Self {
        Self {
            http_enabled: true,
            http_bind: "0.0.0.0:80".to_string(),
            dns_enabled: false,
            dns_bind: "0.0.0.0:53".to_string(),
            dns_fixed_ip: "127.0.0.1".to_string(),
            icmp_enabled: false,
            smb_enabled: false,
            smb_share_dir: PathBuf::from("smb_tasks"),
            smb_task_file: "task.txt".to_string(),
        }
    }
}

/// Admin/control surface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Bind address for the admin API
    pub bind_addr: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}
