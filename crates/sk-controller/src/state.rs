//! Shared state for the controller daemon

use std::sync::Arc;

use sk_core::config::ControllerConfig;

use crate::directory::AgentDirectory;
use crate::orchestrator::ListenerOrchestrator;
use crate::queue::TaskQueue;

/// Everything the admin surface and listener units share
#[derive(Clone)]
pub struct ControllerState {
    pub config: ControllerConfig,
    pub directory: Arc<AgentDirectory>,
    pub queue: Arc<TaskQueue>,
    pub orchestrator: Arc<ListenerOrchestrator>,
}

impl ControllerState {
    /// Build the shared state, opening (or creating) the agent directory
    /// at the configured snapshot path.
    pub fn new(config: ControllerConfig) -> Result<Self, sk_core::error::DirectoryError> {
        let directory = Arc::new(AgentDirectory::open(&config.directory_path)?);
        let queue = Arc::new(TaskQueue::new());
        let orchestrator = Arc::new(ListenerOrchestrator::new(
            config.clone(),
            Arc::clone(&directory),
            Arc::clone(&queue),
        ));
        Ok(Self {
            config,
            directory,
            queue,
            orchestrator,
        })
    }
}
