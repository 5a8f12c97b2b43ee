//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tiered_admission::{
    Category, Clock, SharedWindowStore, StoreError, TierConfig, WindowLimits, WindowVerdict,
};

/// Manually driven clock.
#[derive(Debug, Clone)]
pub struct TestClock {
    now: Arc<Mutex<SystemTime>>,
}

impl TestClock {
    pub fn start() -> Self {
        Self {
            now: Arc::new(Mutex::new(UNIX_EPOCH + Duration::from_secs(1_700_000_000))),
        }
    }

    /// Jump to `secs` seconds after the start instant.
    pub fn at(&self, secs: f64) {
        *self.now.lock().unwrap() =
            UNIX_EPOCH + Duration::from_secs(1_700_000_000) + Duration::from_secs_f64(secs);
    }

    pub fn advance(&self, duration: Duration) {
        *self.now.lock().unwrap() += duration;
    }
}

impl Clock for TestClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap()
    }
}

/// Store wrapper that can be switched into a simulated outage.
#[derive(Debug, Clone)]
pub struct OutageStore {
    inner: Arc<dyn SharedWindowStore>,
    down: Arc<AtomicBool>,
}

impl OutageStore {
    pub fn new(inner: Arc<dyn SharedWindowStore>) -> Self {
        Self {
            inner,
            down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn go_down(&self) {
        self.down.store(true, Ordering::SeqCst);
    }

    pub fn come_back(&self) {
        self.down.store(false, Ordering::SeqCst);
    }

    fn guard(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            Err(StoreError::Connection("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

impl SharedWindowStore for OutageStore {
    fn check_and_record(
        &self,
        key: &str,
        now: f64,
        limits: WindowLimits,
    ) -> Result<WindowVerdict, StoreError> {
        self.guard()?;
        self.inner.check_and_record(key, now, limits)
    }

    fn count_in_range(&self, key: &str, start: f64, end: f64) -> Result<u64, StoreError> {
        self.guard()?;
        self.inner.count_in_range(key, start, end)
    }

    fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        self.guard()?;
        self.inner.incr_with_ttl(key, ttl)
    }

    fn set_with_ttl(&self, key: &str, value: u64, ttl: Duration) -> Result<(), StoreError> {
        self.guard()?;
        self.inner.set_with_ttl(key, value, ttl)
    }

    fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        self.guard()?;
        self.inner.get(key)
    }

    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<u64>>, StoreError> {
        self.guard()?;
        self.inner.get_many(keys)
    }

    fn delete(&self, keys: &[String]) -> Result<(), StoreError> {
        self.guard()?;
        self.inner.delete(keys)
    }

    fn ping(&self) -> Result<(), StoreError> {
        self.guard()?;
        self.inner.ping()
    }
}

/// 6 requests per 60s, bursts of 3 per 10s, backoff capped at 300s.
pub fn mutation_tier() -> TierConfig {
    TierConfig::new(Category::StateMutation, 6, 60, 3, 10.0, 300.0).unwrap()
}
