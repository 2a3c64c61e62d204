//! Core abstractions shared by the Skein agent and controller.
//!
//! This crate holds the domain types (agent identity, commands, transport
//! kinds), the error taxonomy, time helpers, and TOML configuration for both
//! binaries. It performs no network I/O.

pub mod config;
pub mod error;
pub mod time;
pub mod types;

pub use error::{ChannelError, ConfigError, ControlError, DirectoryError, ListenerError};
pub use types::{AgentId, AgentStatus, Command, CommandResult, TransportKind};
