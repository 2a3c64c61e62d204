//! Skein agent library
//!
//! The agent runs one tasking loop and one heartbeat loop per enabled
//! channel. Channels are fail-closed, so a dead transport degrades to
//! empty polls and false heartbeats without disturbing its siblings.

pub mod tasking;

pub use tasking::{heartbeat_loop, polling_loop, CommandExecutor, EchoExecutor};
