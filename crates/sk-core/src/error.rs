//! Error taxonomy for the Skein ecosystem
//!
//! Every failure in the core is scoped to a single channel, listener unit,
//! or operation; nothing here is process-fatal by design.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::TransportKind;

/// Transient failure at a covert-channel boundary.
///
/// These never cross into the tasking loop: each channel catches them, logs,
/// and surfaces its canonical empty value instead.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The peer did not answer within the channel's timeout
    #[error("Channel timed out")]
    Timeout,

    /// Network-level failure (connect, send, receive)
    #[error("Network error: {0}")]
    Network(String),

    /// The peer answered with something the channel could not decode
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The operation is not part of this variant's capability set
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),
}

/// Directory-related errors
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// The snapshot could not be written; in-memory state was rolled back
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization error
    #[error("Snapshot error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Listener-unit errors
#[derive(Error, Debug)]
pub enum ListenerError {
    /// The unit's port is already bound by another process
    #[error("Port already in use for {kind} listener: {addr}")]
    PortInUse { kind: TransportKind, addr: String },

    /// Failed to bind or configure the unit's socket
    #[error("Failed to bind {kind} listener: {source}")]
    Bind {
        kind: TransportKind,
        #[source]
        source: std::io::Error,
    },

    /// I/O error while serving
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Control-surface errors
#[derive(Error, Debug)]
pub enum ControlError {
    /// Another start/stop/restart transition is already executing
    #[error("A lifecycle transition is already in flight")]
    TransitionInFlight,

    /// The orchestrator failed to carry out the requested action
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
