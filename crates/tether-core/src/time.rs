//! Wall-clock helpers.
//!
//! Persisted values (token expiries) use epoch milliseconds so they survive
//! a process restart. In-memory ages (cache entries, heartbeat deadlines)
//! use monotonic `Instant`s in the crates that own them.

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Absolute expiry for a lifetime given in seconds, minus a safety buffer.
///
/// A buffer larger than the lifetime yields an expiry in the past, which
/// forces an immediate refresh on next use.
pub fn expires_at_from_now(expires_in_secs: i64, buffer_secs: i64) -> i64 {
    now_ms() + (expires_in_secs - buffer_secs) * 1000
}
