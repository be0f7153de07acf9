use chrono::{DateTime, Duration, Utc};

/// Current time truncated to millisecond precision.
///
/// Documents serialize `lastModified` as epoch milliseconds, so any stamp we
/// produce must survive that round trip unchanged.
pub fn now_millis() -> DateTime<Utc> {
    from_epoch_millis(Utc::now().timestamp_millis())
}

/// Convert epoch milliseconds to a UTC timestamp, clamping out-of-range input
pub fn from_epoch_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Smallest millisecond stamp strictly after `previous` and not before now
pub fn next_after(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = now_millis();
    match previous {
        Some(prev) if prev >= now => prev + Duration::milliseconds(1),
        _ => now,
    }
}
