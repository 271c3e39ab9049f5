//! Wall-clock helpers shared by the queue files and the progress tables.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as Unix seconds (for DB timestamps and staleness arithmetic).
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Current time as Unix milliseconds (claim-attempt ordering).
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
