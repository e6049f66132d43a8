//! Panic-free time helpers

use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Current Unix timestamp in seconds
///
/// Returns 0 if the system clock is before the epoch rather than
/// panicking.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| {
            warn!("system time is before the UNIX epoch, using 0");
            std::time::Duration::ZERO
        })
        .as_secs()
}
