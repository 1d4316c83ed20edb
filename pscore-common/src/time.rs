//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Unix epoch seconds for `now() + ttl_secs`
pub fn expiry_from_now(ttl_secs: u64) -> i64 {
    now().timestamp() + ttl_secs as i64
}
