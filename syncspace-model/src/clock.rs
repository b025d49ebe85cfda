//! Wall-clock helpers
//!
//! Timestamps in sidecar files and events are Unix seconds; the transport
//! stream reports milliseconds.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix time in seconds.
pub fn unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Current Unix time in milliseconds.
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_and_millis_agree() {
        let secs = unix_seconds();
        let millis = unix_millis();
        assert!(millis / 1000 >= secs - 1);
        assert!(millis / 1000 <= secs + 1);
    }
}
