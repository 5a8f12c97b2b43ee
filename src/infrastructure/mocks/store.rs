//! Shared store with an outage switch.

use crate::application::ports::{SharedWindowStore, StoreError, WindowLimits, WindowVerdict};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Wraps a real store and fails every call while switched off.
///
/// Clones share the switch, so a test can keep one handle and give the
/// other to a controller.
#[derive(Debug, Clone)]
pub struct FlakyStore {
    inner: Arc<dyn SharedWindowStore>,
    failing: Arc<AtomicBool>,
    calls: Arc<AtomicU64>,
}

impl FlakyStore {
    /// Wrap `inner`; starts healthy.
    pub fn new(inner: Arc<dyn SharedWindowStore>) -> Self {
        Self {
            inner,
            failing: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Make every following call fail.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Let calls through again.
    pub fn recover(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }

    /// Whether calls currently fail.
    pub fn is_failing(&self) -> bool {
        self.failing.load(Ordering::SeqCst)
    }

    /// Total calls received, failed or not.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn gate(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.is_failing() {
            Err(StoreError::Connection("simulated outage".to_string()))
        } else {
            Ok(())
        }
    }
}

impl SharedWindowStore for FlakyStore {
    fn check_and_record(
        &self,
        key: &str,
        now: f64,
        limits: WindowLimits,
    ) -> Result<WindowVerdict, StoreError> {
        self.gate()?;
        self.inner.check_and_record(key, now, limits)
    }

    fn count_in_range(&self, key: &str, start: f64, end: f64) -> Result<u64, StoreError> {
        self.gate()?;
        self.inner.count_in_range(key, start, end)
    }

    fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        self.gate()?;
        self.inner.incr_with_ttl(key, ttl)
    }

    fn set_with_ttl(&self, key: &str, value: u64, ttl: Duration) -> Result<(), StoreError> {
        self.gate()?;
        self.inner.set_with_ttl(key, value, ttl)
    }

    fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        self.gate()?;
        self.inner.get(key)
    }

    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<u64>>, StoreError> {
        self.gate()?;
        self.inner.get_many(keys)
    }

    fn delete(&self, keys: &[String]) -> Result<(), StoreError> {
        self.gate()?;
        self.inner.delete(keys)
    }

    fn ping(&self) -> Result<(), StoreError> {
        self.gate()?;
        self.inner.ping()
    }
}
