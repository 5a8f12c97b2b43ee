//! Exponential backoff after repeated violations.
//!
//! `backoff = min(cooldown * 2^min(violations, 6), max_backoff)`.
//!
//! Per actor the state machine is `Normal -> Penalized(n) -> Normal`: each
//! recorded violation raises `n`, and once the record has been idle for its
//! TTL the actor is back to `Normal`. There is no terminal banned state.
//!
//! The count is per actor, but an active penalty is per category: only the
//! categories a violation was recorded against are blocked while it runs.

use crate::domain::tier::{Category, TierConfig};
use crate::domain::timing::elapsed_seconds;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

/// Violation counts above this do not grow the delay further.
pub const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Default inactivity period after which violations are forgotten.
pub const DEFAULT_VIOLATION_TTL: Duration = Duration::from_secs(3600);

/// Backoff delay in seconds for an actor with `violations` recorded violations.
///
/// Pure, non-decreasing in `violations`, never above `max_backoff_seconds`.
pub fn backoff_seconds(violations: u32, tier: &TierConfig) -> f64 {
    let exponent = violations.min(MAX_BACKOFF_EXPONENT);
    let delay = tier.cooldown_seconds() * f64::from(1u32 << exponent);
    delay.min(tier.max_backoff_seconds())
}

/// TTL-bounded violation counter for one actor.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationRecord {
    /// Violations recorded since the record was last reset
    pub count: u32,
    /// When the most recent violation was recorded
    pub recorded_at: SystemTime,
    /// Latest violation per penalized category
    pub penalties: BTreeMap<Category, SystemTime>,
}

impl ViolationRecord {
    /// A record with no violations.
    pub fn new(now: SystemTime) -> Self {
        Self {
            count: 0,
            recorded_at: now,
            penalties: BTreeMap::new(),
        }
    }

    /// Whether the record has been idle for at least `ttl`.
    pub fn is_expired(&self, ttl: Duration, now: SystemTime) -> bool {
        elapsed_seconds(self.recorded_at, now) >= ttl.as_secs_f64()
    }

    /// Record one violation and return the new count.
    ///
    /// With a category, that category is penalized from `now`. An expired
    /// record starts over from zero first.
    pub fn record(&mut self, category: Option<Category>, ttl: Duration, now: SystemTime) -> u32 {
        if self.is_expired(ttl, now) {
            self.count = 0;
            self.penalties.clear();
        }
        self.count = self.count.saturating_add(1);
        if now > self.recorded_at {
            self.recorded_at = now;
        }
        if let Some(category) = category {
            let since = self.penalties.entry(category).or_insert(now);
            if now > *since {
                *since = now;
            }
        }
        self.count
    }

    /// Violations that still count at `now`.
    pub fn active_count(&self, ttl: Duration, now: SystemTime) -> u32 {
        if self.is_expired(ttl, now) {
            0
        } else {
            self.count
        }
    }

    /// Latest violation recorded against `category`, if it is still active.
    pub fn penalized_since(
        &self,
        category: Category,
        ttl: Duration,
        now: SystemTime,
    ) -> Option<SystemTime> {
        if self.is_expired(ttl, now) {
            return None;
        }
        self.penalties.get(&category).copied()
    }

    /// Seconds of penalty left on `category` at `now`, timed by `tier`.
    pub fn penalty_remaining(
        &self,
        category: Category,
        tier: &TierConfig,
        ttl: Duration,
        now: SystemTime,
    ) -> Option<f64> {
        let since = self.penalized_since(category, ttl, now)?;
        penalty_remaining(self.active_count(ttl, now), since, tier, now)
    }
}

/// Seconds of penalty left for `count` violations, the latest at `since`.
pub fn penalty_remaining(
    count: u32,
    since: SystemTime,
    tier: &TierConfig,
    now: SystemTime,
) -> Option<f64> {
    if count == 0 {
        return None;
    }
    let remaining = backoff_seconds(count, tier) - elapsed_seconds(since, now);
    (remaining > 0.0).then_some(remaining)
}
