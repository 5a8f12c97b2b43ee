//! Periodic removal of idle local state.
//!
//! Bounds memory under many distinct actors. A bucket idle for longer than
//! the slowest tier's full-refill time is indistinguishable from a fresh one,
//! and an expired violation record counts as zero, so a sweep never changes
//! a decision.

use crate::application::local::LocalActorState;
use crate::application::metrics::Metrics;
use crate::application::ports::Clock;
use crate::application::violations::ViolationTracker;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

#[cfg(feature = "async")]
use tokio::time::interval;

/// Error returned when reaper configuration validation fails.
#[derive(Debug, Clone, PartialEq)]
pub enum ReaperConfigError {
    /// Sweep interval must be greater than zero
    ZeroInterval,
    /// Retention is shorter than the slowest tier needs to refill
    RetentionTooShort {
        /// Configured retention
        retention: Duration,
        /// Slowest full-refill time across the catalog, in seconds
        required_seconds: f64,
    },
}

impl std::fmt::Display for ReaperConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReaperConfigError::ZeroInterval => write!(f, "reaper interval must be greater than 0"),
            ReaperConfigError::RetentionTooShort {
                retention,
                required_seconds,
            } => write!(
                f,
                "reaper retention {:?} is shorter than the slowest refill ({}s)",
                retention, required_seconds
            ),
        }
    }
}

impl std::error::Error for ReaperConfigError {}

/// Configuration for the reaper.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// How often to sweep
    pub interval: Duration,
    /// Idle time after which a bucket is removed
    pub retention: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            retention: Duration::from_secs(3600),
        }
    }
}

impl ReaperConfig {
    /// Create a reaper config.
    ///
    /// # Errors
    /// Returns `ReaperConfigError::ZeroInterval` if `interval` is zero.
    pub fn new(interval: Duration, retention: Duration) -> Result<Self, ReaperConfigError> {
        if interval.is_zero() {
            return Err(ReaperConfigError::ZeroInterval);
        }
        Ok(Self {
            interval,
            retention,
        })
    }
}

/// Sweeps idle buckets and expired violation records.
#[derive(Debug)]
pub struct Reaper {
    local: LocalActorState,
    violations: ViolationTracker,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    config: ReaperConfig,
}

impl Reaper {
    pub(crate) fn new(
        local: LocalActorState,
        violations: ViolationTracker,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
        config: ReaperConfig,
        slowest_refill_seconds: f64,
    ) -> Result<Self, ReaperConfigError> {
        if config.interval.is_zero() {
            return Err(ReaperConfigError::ZeroInterval);
        }
        if config.retention.as_secs_f64() < slowest_refill_seconds {
            return Err(ReaperConfigError::RetentionTooShort {
                retention: config.retention,
                required_seconds: slowest_refill_seconds,
            });
        }
        Ok(Self {
            local,
            violations,
            clock,
            metrics,
            config,
        })
    }

    /// Remove idle state as of `now`. Returns the number of entries removed.
    pub fn sweep_at(&self, now: SystemTime) -> usize {
        let buckets = self.local.remove_idle(self.config.retention, now);
        let records = self.violations.remove_expired(now);
        let removed = buckets + records;

        if removed > 0 {
            self.metrics.record_reaped(removed as u64);
            tracing::debug!(buckets, records, "Reaped idle actor state");
        }
        removed
    }

    /// Remove idle state as of the clock's current time.
    pub fn sweep(&self) -> usize {
        self.sweep_at(self.clock.now())
    }

    /// Start sweeping periodically (async version).
    ///
    /// This spawns a background task that sweeps at the configured interval.
    #[cfg(feature = "async")]
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.interval);

            loop {
                ticker.tick().await;
                self.sweep();
            }
        })
    }

    /// Get the reaper configuration.
    pub fn config(&self) -> &ReaperConfig {
        &self.config
    }
}
