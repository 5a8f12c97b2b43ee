//! Gatekeeper for every call into the shared store.
//!
//! Each call is skipped while the store is marked unhealthy. Otherwise it runs
//! and its outcome feeds the health tracker. A failure is logged, counted, and
//! turned into `None` so the caller takes its local path. Store errors never
//! travel further than this module.

use crate::application::health::{HealthState, SharedStoreHealth};
use crate::application::metrics::Metrics;
use crate::application::ports::{SharedWindowStore, StoreError};
use std::sync::Arc;

/// Shared store plus the health tracker that decides whether to use it.
#[derive(Debug, Clone)]
pub(crate) struct SharedPath {
    store: Arc<dyn SharedWindowStore>,
    health: SharedStoreHealth,
    metrics: Metrics,
}

impl SharedPath {
    pub(crate) fn new(
        store: Arc<dyn SharedWindowStore>,
        health: SharedStoreHealth,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            health,
            metrics,
        }
    }

    /// Whether the store is fully healthy.
    pub(crate) fn is_healthy(&self) -> bool {
        self.health.state() == HealthState::Healthy
    }

    /// Run `operation` against the store if it is usable.
    ///
    /// Returns `None` when the store is bypassed or the operation failed.
    pub(crate) fn call<T, F>(&self, operation: &'static str, f: F) -> Option<T>
    where
        F: FnOnce(&dyn SharedWindowStore) -> Result<T, StoreError>,
    {
        if !self.health.should_use_store() {
            return None;
        }

        match f(self.store.as_ref()) {
            Ok(value) => {
                self.on_success();
                Some(value)
            }
            Err(e) => {
                self.on_failure(operation, &e);
                None
            }
        }
    }

    /// Ping the store if a recovery attempt is due.
    ///
    /// Returns `true` if the store is healthy afterwards.
    pub(crate) fn probe(&self) -> bool {
        if self.is_healthy() {
            return true;
        }
        if !self.health.try_begin_probe() {
            return false;
        }

        match self.store.ping() {
            Ok(()) => {
                self.on_success();
                true
            }
            Err(e) => {
                self.on_failure("ping", &e);
                false
            }
        }
    }

    fn on_success(&self) {
        if self.health.record_success() {
            tracing::info!("Shared store healthy again, leaving degraded mode");
        }
    }

    fn on_failure(&self, operation: &'static str, error: &StoreError) {
        self.metrics.record_store_failure();
        let degraded = self.health.record_failure();
        tracing::warn!(
            error = %error,
            operation,
            degraded,
            "Shared store call failed, using local state"
        );
    }
}
