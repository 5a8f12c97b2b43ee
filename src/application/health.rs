//! Health tracking for the shared coordination store.
//!
//! A circuit breaker around the shared path. While `Healthy`, checks go to the
//! shared store. A failure (or `failure_threshold` consecutive failures) marks
//! it `Unhealthy` and every check takes the local path. After
//! `recovery_timeout` one caller moves it to `Probing` and tries the store
//! again: success restores `Healthy`, failure re-opens the breaker.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Health states of the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Store is used for every check
    Healthy = 0,
    /// Store is bypassed; local fallback in effect
    Unhealthy = 1,
    /// Recovery attempt in progress
    Probing = 2,
}

impl From<u8> for HealthState {
    fn from(value: u8) -> Self {
        match value {
            0 => HealthState::Healthy,
            1 => HealthState::Unhealthy,
            2 => HealthState::Probing,
            _ => HealthState::Healthy,
        }
    }
}

/// Configuration for store health tracking.
#[derive(Debug, Clone)]
pub struct StoreHealthConfig {
    /// Consecutive failures before the store is marked unhealthy
    pub failure_threshold: u32,
    /// How long the store stays bypassed before a recovery attempt
    pub recovery_timeout: Duration,
}

impl Default for StoreHealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// Lock-free health tracker shared by every caller of one controller.
#[derive(Debug)]
pub struct StoreHealth {
    state: AtomicU8,
    consecutive_failures: AtomicU64,
    last_failure_time_nanos: AtomicU64,
    config: StoreHealthConfig,
    /// Reference epoch for timestamp calculations
    epoch: Instant,
}

impl StoreHealth {
    /// Create a tracker with default configuration.
    pub fn new() -> Self {
        Self::with_config(StoreHealthConfig::default())
    }

    /// Create a tracker with custom configuration.
    pub fn with_config(config: StoreHealthConfig) -> Self {
        Self {
            state: AtomicU8::new(HealthState::Healthy as u8),
            consecutive_failures: AtomicU64::new(0),
            last_failure_time_nanos: AtomicU64::new(0),
            config,
            epoch: Instant::now(),
        }
    }

    /// Get the current state.
    pub fn state(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Acquire))
    }

    /// Get the configuration.
    pub fn config(&self) -> &StoreHealthConfig {
        &self.config
    }

    /// Whether this call should try the shared store.
    ///
    /// Returns `false` while the store is bypassed. Once the recovery timeout
    /// has elapsed, the one caller that flips the state to `Probing` gets
    /// `true`; everyone else stays local until the store is `Healthy` again.
    pub fn should_use_store(&self) -> bool {
        match self.state() {
            HealthState::Healthy => true,
            HealthState::Unhealthy => self.try_begin_probe(),
            HealthState::Probing => false,
        }
    }

    /// Move `Unhealthy -> Probing` if the recovery timeout has elapsed.
    ///
    /// Returns `true` only for the caller that made the transition.
    pub fn try_begin_probe(&self) -> bool {
        if self.state() != HealthState::Unhealthy {
            return false;
        }

        let since_failure = Instant::now().saturating_duration_since(self.last_failure_time());
        if since_failure < self.config.recovery_timeout {
            return false;
        }

        // Only one thread wins the transition
        self.state
            .compare_exchange(
                HealthState::Unhealthy as u8,
                HealthState::Probing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Record a successful store operation.
    ///
    /// Returns `true` if this restored the store to `Healthy`.
    pub fn record_success(&self) -> bool {
        match self.state() {
            HealthState::Probing => {
                self.consecutive_failures.store(0, Ordering::Release);
                self.state
                    .compare_exchange(
                        HealthState::Probing as u8,
                        HealthState::Healthy as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
            }
            HealthState::Healthy => {
                self.consecutive_failures.store(0, Ordering::Release);
                false
            }
            // A slow call that started before the breaker opened
            HealthState::Unhealthy => false,
        }
    }

    /// Record a failed store operation.
    ///
    /// Returns `true` if this call moved the store out of `Healthy` or `Probing`.
    pub fn record_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;

        let nanos = Instant::now()
            .duration_since(self.epoch)
            .as_nanos()
            .try_into()
            .unwrap_or(u64::MAX);
        self.last_failure_time_nanos.store(nanos, Ordering::Release);

        match self.state() {
            HealthState::Probing => self
                .state
                .compare_exchange(
                    HealthState::Probing as u8,
                    HealthState::Unhealthy as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok(),
            HealthState::Healthy if failures >= u64::from(self.config.failure_threshold) => self
                .state
                .compare_exchange(
                    HealthState::Healthy as u8,
                    HealthState::Unhealthy as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok(),
            _ => false,
        }
    }

    fn last_failure_time(&self) -> Instant {
        let nanos = self.last_failure_time_nanos.load(Ordering::Acquire);
        self.epoch + Duration::from_nanos(nanos)
    }

    /// Get the number of consecutive failures.
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Force the tracker back to `Healthy`.
    pub fn reset(&self) {
        self.state
            .store(HealthState::Healthy as u8, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
    }
}

impl Default for StoreHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Shareable health tracker reference.
pub type SharedStoreHealth = Arc<StoreHealth>;
