//! Admission decisions returned to callers.

use std::fmt;
use std::time::Duration;

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenialReason {
    /// The request was admitted
    None,
    /// The sliding-window capacity is used up
    WindowExceeded,
    /// Too many requests within one cooldown period
    BurstExceeded,
    /// The actor is serving a backoff penalty for recorded violations
    Backoff,
}

impl DenialReason {
    /// Stable snake_case name for logs and collaborators.
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::None => "none",
            DenialReason::WindowExceeded => "window_exceeded",
            DenialReason::BurstExceeded => "burst_exceeded",
            DenialReason::Backoff => "backoff",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one admission check.
///
/// Built fresh per call and never persisted. `retry_after_seconds` is zero when
/// allowed and never negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmissionDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Seconds the caller should wait before retrying
    pub retry_after_seconds: f64,
    /// Why the request was denied
    pub reason: DenialReason,
}

impl AdmissionDecision {
    /// An admitting decision.
    pub fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_seconds: 0.0,
            reason: DenialReason::None,
        }
    }

    /// A denying decision. Negative or non-finite waits are clamped to zero.
    pub fn deny(reason: DenialReason, retry_after_seconds: f64) -> Self {
        let retry_after_seconds = if retry_after_seconds.is_finite() {
            retry_after_seconds.max(0.0)
        } else {
            0.0
        };
        Self {
            allowed: false,
            retry_after_seconds,
            reason,
        }
    }

    /// Check if this decision admits the request.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Check if this decision denies the request.
    pub fn is_denied(&self) -> bool {
        !self.allowed
    }

    /// The suggested wait as a `Duration`.
    pub fn retry_after(&self) -> Duration {
        Duration::from_secs_f64(self.retry_after_seconds)
    }
}
