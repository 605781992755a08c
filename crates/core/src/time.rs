//! Wall-clock helpers.
//!
//! All protocol timestamps are integral Unix milliseconds so the canonical
//! wire encoding never depends on float formatting.

use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp in milliseconds.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
