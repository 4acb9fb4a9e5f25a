/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Returns the current wall-clock time as Unix epoch milliseconds.
pub fn timestamp_now() -> Timestamp {
    let dur = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    dur.as_millis() as Timestamp
}

/// Milliseconds in one minute, used for arena deadlines.
pub const MS_PER_MINUTE: u64 = 60_000;
