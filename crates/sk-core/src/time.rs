//! Time helpers
//!
//! The directory stores `registered_at` and `last_seen` as Unix seconds, so
//! everything here works in whole seconds.

use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp in seconds.
///
/// # Panics
/// Panics if the system time is before the Unix epoch, which would indicate
/// a severely misconfigured system.
pub fn unix_time_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX epoch")
        .as_secs()
}

/// Seconds elapsed since a given Unix timestamp.
///
/// Returns 0 if the given time is in the future.
pub fn elapsed_secs(since: u64) -> u64 {
    unix_time_secs().saturating_sub(since)
}
