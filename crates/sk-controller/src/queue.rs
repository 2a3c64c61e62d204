//! Per-agent task queue
//!
//! Commands are queued by the admin surface and drained exactly once when
//! the owning agent polls over HTTP; reported results are kept alongside for
//! the operator to read back.

use std::collections::VecDeque;

use dashmap::DashMap;

use sk_core::types::{AgentId, Command, CommandResult};

/// Queued tasking and reported results, indexed by agent
#[derive(Default)]
pub struct TaskQueue {
    pending: DashMap<AgentId, VecDeque<Command>>,
    results: DashMap<AgentId, Vec<CommandResult>>,
}

impl TaskQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command for an agent
    pub fn push(&self, agent_id: &AgentId, command: Command) {
        tracing::info!(agent_id = %agent_id, command_id = %command.id, "Command queued");
        self.pending
            .entry(agent_id.clone())
            .or_default()
            .push_back(command);
    }

    /// Take every pending command for an agent, in queue order.
    ///
    /// Each command is handed out exactly once; a second drain returns
    /// nothing until new commands are queued.
    pub fn drain(&self, agent_id: &AgentId) -> Vec<Command> {
        match self.pending.get_mut(agent_id) {
            Some(mut queue) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// Record a result reported by an agent
    pub fn record_result(&self, result: CommandResult) {
        self.results
            .entry(result.agent_id.clone())
            .or_default()
            .push(result);
    }

    /// Results reported by an agent so far
    pub fn results_for(&self, agent_id: &AgentId) -> Vec<CommandResult> {
        self.results
            .get(agent_id)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    /// Number of commands still pending for an agent
    pub fn pending_len(&self, agent_id: &AgentId) -> usize {
        self.pending.get(agent_id).map(|q| q.len()).unwrap_or(0)
    }
}
