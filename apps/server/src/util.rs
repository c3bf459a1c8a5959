//! Small shared helpers

/// Current server clock as Unix epoch milliseconds
///
/// Every timestamp the server stamps into state or onto the wire comes
/// from here, so tests and callers agree on the unit.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
