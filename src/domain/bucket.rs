//! In-process token bucket used when the shared store is unavailable.
//!
//! Capacity is the tier's `burst_size`; tokens refill continuously at
//! `requests_per_window / window_seconds` per second. The cooldown gate only
//! applies once the bucket cannot serve a request: an empty bucket shortly
//! after the last admitted request reads as a burst, an empty bucket after a
//! quiet cooldown period reads as sustained overuse of the window.

use crate::domain::tier::TierConfig;
use crate::domain::timing::elapsed_seconds;
use std::time::SystemTime;

/// Result of trying to take a token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BucketOutcome {
    /// A token was consumed
    Acquired,
    /// Empty within the cooldown of the last admitted request
    CoolingDown {
        /// `cooldown_seconds - elapsed` since the last admitted request
        retry_after_seconds: f64,
    },
    /// Empty outside the cooldown; sustained rate exceeded
    Exhausted {
        /// Seconds until one whole token is available again
        next_token_seconds: f64,
    },
}

/// Token bucket state for one (actor, category) pair.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    last_refill_at: SystemTime,
    last_action_at: Option<SystemTime>,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn full(tier: &TierConfig, now: SystemTime) -> Self {
        Self {
            tokens: tier.burst_size() as f64,
            last_refill_at: now,
            last_action_at: None,
        }
    }

    /// Add tokens for the time elapsed since the last refill.
    ///
    /// A clock that moved backwards adds nothing and leaves the refill mark
    /// where it was.
    fn refill(&mut self, tier: &TierConfig, now: SystemTime) {
        let elapsed = elapsed_seconds(self.last_refill_at, now);
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * tier.refill_rate()).min(tier.burst_size() as f64);
            self.last_refill_at = now;
        }
    }

    /// Refill, then try to consume one token.
    pub fn try_acquire(&mut self, tier: &TierConfig, now: SystemTime) -> BucketOutcome {
        self.refill(tier, now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            self.last_action_at = Some(match self.last_action_at {
                Some(previous) if previous > now => previous,
                _ => now,
            });
            return BucketOutcome::Acquired;
        }

        let since_last_action = self
            .last_action_at
            .map(|last| elapsed_seconds(last, now));

        match since_last_action {
            Some(elapsed) if elapsed < tier.cooldown_seconds() => BucketOutcome::CoolingDown {
                retry_after_seconds: tier.cooldown_seconds() - elapsed,
            },
            _ => BucketOutcome::Exhausted {
                next_token_seconds: (1.0 - self.tokens).max(0.0) / tier.refill_rate(),
            },
        }
    }

    /// Tokens that would be available at `now`, without mutating the bucket.
    pub fn available(&self, tier: &TierConfig, now: SystemTime) -> f64 {
        let elapsed = elapsed_seconds(self.last_refill_at, now);
        (self.tokens + elapsed * tier.refill_rate()).min(tier.burst_size() as f64)
    }

    /// Most recent moment this bucket was touched.
    pub fn last_activity(&self) -> SystemTime {
        match self.last_action_at {
            Some(action) if action > self.last_refill_at => action,
            _ => self.last_refill_at,
        }
    }
}
