//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::tier::TierConfig;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::time::{Duration, SystemTime};

/// Port for obtaining current time.
///
/// Wall-clock time, so timestamps recorded in a shared store are comparable
/// between processes. Infrastructure provides `SystemClock` and `MockClock`.
pub trait Clock: Send + Sync + Debug {
    /// Get the current time.
    fn now(&self) -> SystemTime;
}

/// Port for concurrent in-process key-value storage.
///
/// Implementations must lock per key (or per shard) so that unrelated keys
/// never contend on a single mutex, and `retain` must take the same locks as
/// `with_entry_mut` so removal cannot race a concurrent update.
pub trait Storage<K, V>: Send + Sync + Debug
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Access an entry with mutable access, creating it if necessary.
    ///
    /// # Arguments
    /// * `key` - The key to look up
    /// * `factory` - Function to create a new value if the key doesn't exist
    /// * `accessor` - Function that gets mutable access to the value
    ///
    /// # Returns
    /// The result from the accessor function
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R;

    /// Read an existing entry without creating it.
    fn inspect<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&V) -> R;

    /// Get the number of entries in the storage.
    fn len(&self) -> usize;

    /// Check if the storage is empty.
    fn is_empty(&self) -> bool;

    /// Clear all entries from the storage.
    fn clear(&self);

    /// Remove entries for which the predicate returns false.
    fn retain<F>(&self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool;
}

/// Failure talking to the shared coordination store.
///
/// Never surfaced to admission callers: the controller reads any `StoreError`
/// as "use the local path".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The operation did not finish within the configured bound
    Timeout(Duration),
    /// The connection failed or was refused
    Connection(String),
    /// The store answered with something unexpected
    Protocol(String),
    /// The store cannot be used from the current context
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Timeout(bound) => write!(f, "shared store timed out after {:?}", bound),
            StoreError::Connection(e) => write!(f, "shared store connection error: {}", e),
            StoreError::Protocol(e) => write!(f, "shared store protocol error: {}", e),
            StoreError::Unavailable(e) => write!(f, "shared store unavailable: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Limits passed to the atomic window operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowLimits {
    /// Sliding window length in seconds
    pub window_seconds: f64,
    /// Maximum entries in the window
    pub capacity: u32,
    /// Burst range length in seconds
    pub cooldown_seconds: f64,
    /// Maximum entries in the burst range
    pub burst_size: u32,
}

impl From<&TierConfig> for WindowLimits {
    fn from(tier: &TierConfig) -> Self {
        Self {
            window_seconds: tier.window_seconds() as f64,
            capacity: tier.requests_per_window(),
            cooldown_seconds: tier.cooldown_seconds(),
            burst_size: tier.burst_size(),
        }
    }
}

/// Result of the atomic prune-count-insert operation on one window key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowVerdict {
    /// `now` was inserted
    Recorded {
        /// Entries in the window before the insert
        count_before: u64,
    },
    /// The window already holds `capacity` entries; nothing inserted
    WindowFull {
        /// Entries in the window
        count: u64,
        /// Timestamp (unix seconds) of the oldest entry in the window
        oldest: f64,
    },
    /// The burst range already holds `burst_size` entries; nothing inserted
    BurstFull {
        /// Entries in the burst range
        count: u64,
        /// Timestamp (unix seconds) whose expiry from the burst range frees a slot
        pivot: f64,
    },
}

/// Port for the optional shared coordination store.
///
/// Timestamps are unix seconds. Keys are logical (`window:<category>:<actor>`);
/// adapters may add their own namespace. Every call must be bounded in time.
pub trait SharedWindowStore: Send + Sync + Debug {
    /// Atomically, per key: drop entries older than `now - window_seconds`,
    /// deny if the window is full, deny if the burst range
    /// `(now - cooldown_seconds, now]` is full, otherwise insert `now` and push
    /// the key's expiry slightly past the window.
    ///
    /// An entry exactly `cooldown_seconds` old no longer counts toward the
    /// burst, so waiting `pivot + cooldown_seconds - now` frees a slot.
    fn check_and_record(
        &self,
        key: &str,
        now: f64,
        limits: WindowLimits,
    ) -> Result<WindowVerdict, StoreError>;

    /// Count entries with timestamps in `[start, end]`.
    fn count_in_range(&self, key: &str, start: f64, end: f64) -> Result<u64, StoreError>;

    /// Increment a counter, (re)setting its time-to-live. Returns the new value.
    fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;

    /// Store a value with a time-to-live.
    fn set_with_ttl(&self, key: &str, value: u64, ttl: Duration) -> Result<(), StoreError>;

    /// Read a value, `None` when absent or expired.
    fn get(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Read several values in one round trip, in key order.
    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<u64>>, StoreError> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Delete keys. Missing keys are not an error.
    fn delete(&self, keys: &[String]) -> Result<(), StoreError>;

    /// Cheap liveness check used by health probes.
    fn ping(&self) -> Result<(), StoreError>;
}
