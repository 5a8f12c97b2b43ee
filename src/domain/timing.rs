//! Wall-clock arithmetic shared by the local and shared paths.
//!
//! Timestamps are `SystemTime` so they compare across processes. A clock that
//! steps backwards yields zero elapsed time, never a negative one.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds elapsed from `earlier` to `later`, or zero if `later` precedes it.
pub fn elapsed_seconds(earlier: SystemTime, later: SystemTime) -> f64 {
    later
        .duration_since(earlier)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64()
}

/// Seconds since the Unix epoch, with sub-second precision.
pub fn unix_seconds(at: SystemTime) -> f64 {
    at.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64()
}

/// Inverse of [`unix_seconds`]. Negative or non-finite inputs map to the epoch.
pub fn from_unix_seconds(secs: f64) -> SystemTime {
    if secs.is_finite() && secs > 0.0 {
        UNIX_EPOCH + Duration::from_secs_f64(secs)
    } else {
        UNIX_EPOCH
    }
}
