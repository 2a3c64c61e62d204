//! Agent directory
//!
//! The authoritative registry of agent identities, tokens, and liveness.
//! Records are kept in memory behind a single async mutex and mirrored to a
//! JSON snapshot on every mutation; the mutex is the global serialization
//! point the concurrency contract calls for (write volume is low).
//!
//! Reported success always matches persisted state: if the snapshot write
//! fails, the in-memory mutation is rolled back before the error is
//! returned.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use sk_core::error::DirectoryError;
use sk_core::time::unix_time_secs;
use sk_core::types::{AgentId, AgentStatus};

/// One directory record, as persisted
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AgentRecord {
    /// Unique, immutable key
    pub agent_id: AgentId,
    /// Opaque token, assigned once and never rotated
    pub auth_token: String,
    /// Last known source address
    pub ip_address: String,
    /// Unix seconds, fixed at first registration
    pub registered_at: u64,
    /// Unix seconds, monotonically non-decreasing
    pub last_seen: u64,
    /// Liveness status
    pub status: AgentStatus,
}

/// Persisted registry of agent identities
pub struct AgentDirectory {
    path: PathBuf,
    records: Mutex<HashMap<AgentId, AgentRecord>>,
}

impl AgentDirectory {
    /// Open a directory backed by the snapshot at `path`.
    ///
    /// Starts empty when no snapshot exists yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DirectoryError> {
        let path = path.into();
        let records = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let list: Vec<AgentRecord> = serde_json::from_str(&content)?;
            list.into_iter()
                .map(|record| (record.agent_id.clone(), record))
                .collect()
        } else {
            HashMap::new()
        };

        tracing::info!(
            path = %path.display(),
            agents = records.len(),
            "Agent directory opened"
        );

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Register an agent, returning its auth token.
    ///
    /// Idempotent: an existing agent gets its IP, last-seen, and status
    /// refreshed and the originally issued token back, unchanged. A new
    /// agent gets a freshly generated token and a full record.
    pub async fn register(
        &self,
        agent_id: &AgentId,
        ip_address: &str,
    ) -> Result<String, DirectoryError> {
        let mut records = self.records.lock().await;
        let now = unix_time_secs();

        let previous = records.get(agent_id).cloned();
        let token = match records.get_mut(agent_id) {
            Some(record) => {
                record.ip_address = ip_address.to_string();
                record.last_seen = record.last_seen.max(now);
                record.status = AgentStatus::Online;
                record.auth_token.clone()
            }
            None => {
                let token = uuid::Uuid::new_v4().to_string();
                records.insert(
                    agent_id.clone(),
                    AgentRecord {
                        agent_id: agent_id.clone(),
                        auth_token: token.clone(),
                        ip_address: ip_address.to_string(),
                        registered_at: now,
                        last_seen: now,
                        status: AgentStatus::Online,
                    },
                );
                token
            }
        };

        if let Err(e) = self.persist(&records) {
            // Roll back so reported state matches stored state
            match previous {
                Some(record) => {
                    records.insert(agent_id.clone(), record);
                }
                None => {
                    records.remove(agent_id);
                }
            }
            return Err(e);
        }

        tracing::info!(agent_id = %agent_id, ip = ip_address, "Agent registered");
        Ok(token)
    }

    /// Check an agent's token.
    ///
    /// True only for a known agent with an exactly matching token; any
    /// mismatch or unknown agent resolves to false, never an error.
    pub async fn authenticate(&self, agent_id: &AgentId, auth_token: &str) -> bool {
        let records = self.records.lock().await;
        records
            .get(agent_id)
            .map(|record| record.auth_token == auth_token)
            .unwrap_or(false)
    }

    /// Snapshot of all records; order is not significant
    pub async fn list(&self) -> Vec<AgentRecord> {
        let records = self.records.lock().await;
        records.values().cloned().collect()
    }

    /// Update an agent's status and bump its last-seen time.
    ///
    /// A no-op (not an error) when the agent is unknown.
    pub async fn update_status(
        &self,
        agent_id: &AgentId,
        status: AgentStatus,
    ) -> Result<(), DirectoryError> {
        let mut records = self.records.lock().await;

        let Some(previous) = records.get(agent_id).cloned() else {
            return Ok(());
        };

        if let Some(record) = records.get_mut(agent_id) {
            record.status = status;
            record.last_seen = record.last_seen.max(unix_time_secs());
        }

        if let Err(e) = self.persist(&records) {
            records.insert(agent_id.clone(), previous);
            return Err(e);
        }
        Ok(())
    }

    /// Number of registered agents
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Whether the directory holds no records
    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Write the snapshot atomically (temp file + rename)
    fn persist(&self, records: &HashMap<AgentId, AgentRecord>) -> Result<(), DirectoryError> {
        let list: Vec<&AgentRecord> = records.values().collect();
        let content = serde_json::to_string_pretty(&list)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DirectoryError::Persistence(e.to_string()))?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| DirectoryError::Persistence(e.to_string()))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| DirectoryError::Persistence(e.to_string()))?;
        Ok(())
    }

    /// Snapshot path this directory persists to
    pub fn path(&self) -> &Path {
        &self.path
    }
}
