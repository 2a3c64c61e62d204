//! Skein controller library
//!
//! Owns the authoritative agent directory, the per-agent task queue, and the
//! listener orchestrator that runs one listener unit per enabled covert
//! transport. The admin/control HTTP surface in [`control`] is the external
//! boundary that drives the orchestrator.

pub mod control;
pub mod directory;
pub mod listeners;
pub mod orchestrator;
pub mod queue;
pub mod state;

pub use directory::{AgentDirectory, AgentRecord};
pub use orchestrator::{ListenerOrchestrator, ListenerState};
pub use queue::TaskQueue;
pub use state::ControllerState;
