//! Timestamp helpers.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Wall-clock timestamp used on records.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Time elapsed from `since` to `now`. Zero if `now` is earlier.
#[must_use]
pub fn elapsed_between(since: Timestamp, now: Timestamp) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

/// True once `ttl` has fully elapsed since `since`.
#[must_use]
pub fn ttl_elapsed(since: Timestamp, ttl: Duration, now: Timestamp) -> bool {
    elapsed_between(since, now) >= ttl
}

/// Adds a std duration to a timestamp, saturating at the far future.
#[must_use]
pub fn add_duration(ts: Timestamp, duration: Duration) -> Timestamp {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| ts.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Subtracts a std duration from a timestamp, saturating at the far past.
#[must_use]
pub fn sub_duration(ts: Timestamp, duration: Duration) -> Timestamp {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| ts.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
