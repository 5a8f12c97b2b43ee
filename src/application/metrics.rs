//! Observability metrics for admission control.
//!
//! Provides counters about admission behavior for monitoring and debugging.

use crate::domain::decision::{AdmissionDecision, DenialReason};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking admission statistics.
///
/// All metrics use atomic operations for thread-safe updates and reads.
/// Clones share the same counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Requests admitted
    admitted: AtomicU64,
    /// Requests denied because the window was full
    denied_window: AtomicU64,
    /// Requests denied because the burst allowance was used up
    denied_burst: AtomicU64,
    /// Requests denied while serving a backoff penalty
    denied_backoff: AtomicU64,
    /// Shared-store operations that failed and fell back to local state
    store_failures: AtomicU64,
    /// Violations recorded by collaborators
    violations_recorded: AtomicU64,
    /// State entries removed by the reaper
    entries_reaped: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    /// Record the outcome of one check.
    pub(crate) fn record_decision(&self, decision: &AdmissionDecision) {
        let counter = match decision.reason {
            DenialReason::None => &self.inner.admitted,
            DenialReason::WindowExceeded => &self.inner.denied_window,
            DenialReason::BurstExceeded => &self.inner.denied_burst,
            DenialReason::Backoff => &self.inner.denied_backoff,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a shared-store failure.
    pub(crate) fn record_store_failure(&self) {
        self.inner.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a violation.
    pub(crate) fn record_violation(&self) {
        self.inner
            .violations_recorded
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record reaped entries.
    pub(crate) fn record_reaped(&self, count: u64) {
        self.inner.entries_reaped.fetch_add(count, Ordering::Relaxed);
    }

    /// Get the number of admitted requests.
    pub fn admitted(&self) -> u64 {
        self.inner.admitted.load(Ordering::Relaxed)
    }

    /// Get the number of window denials.
    pub fn denied_window(&self) -> u64 {
        self.inner.denied_window.load(Ordering::Relaxed)
    }

    /// Get the number of burst denials.
    pub fn denied_burst(&self) -> u64 {
        self.inner.denied_burst.load(Ordering::Relaxed)
    }

    /// Get the number of backoff denials.
    pub fn denied_backoff(&self) -> u64 {
        self.inner.denied_backoff.load(Ordering::Relaxed)
    }

    /// Get the number of shared-store failures.
    pub fn store_failures(&self) -> u64 {
        self.inner.store_failures.load(Ordering::Relaxed)
    }

    /// Get the number of recorded violations.
    pub fn violations_recorded(&self) -> u64 {
        self.inner.violations_recorded.load(Ordering::Relaxed)
    }

    /// Get the number of reaped entries.
    pub fn entries_reaped(&self) -> u64 {
        self.inner.entries_reaped.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            admitted: self.admitted(),
            denied_window: self.denied_window(),
            denied_burst: self.denied_burst(),
            denied_backoff: self.denied_backoff(),
            store_failures: self.store_failures(),
            violations_recorded: self.violations_recorded(),
            entries_reaped: self.entries_reaped(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.admitted,
            &inner.denied_window,
            &inner.denied_burst,
            &inner.denied_backoff,
            &inner.store_failures,
            &inner.violations_recorded,
            &inner.entries_reaped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Requests admitted
    pub admitted: u64,
    /// Window denials
    pub denied_window: u64,
    /// Burst denials
    pub denied_burst: u64,
    /// Backoff denials
    pub denied_backoff: u64,
    /// Shared-store failures
    pub store_failures: u64,
    /// Violations recorded
    pub violations_recorded: u64,
    /// Entries removed by the reaper
    pub entries_reaped: u64,
}

impl MetricsSnapshot {
    /// Total denials of any reason.
    pub fn denied(&self) -> u64 {
        self.denied_window
            .saturating_add(self.denied_burst)
            .saturating_add(self.denied_backoff)
    }

    /// Total checks (admitted + denied).
    pub fn total_checks(&self) -> u64 {
        self.admitted.saturating_add(self.denied())
    }

    /// Ratio of denied checks, 0.0 when nothing was checked.
    pub fn denial_rate(&self) -> f64 {
        let total = self.total_checks();
        if total == 0 {
            0.0
        } else {
            self.denied() as f64 / total as f64
        }
    }
}
