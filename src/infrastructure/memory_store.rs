//! Process-local implementation of the shared window store.
//!
//! Serves single-node deployments, and lets several controllers in one
//! process share a store the way separate workers share Redis. Every
//! operation on a key runs under that key's shard lock, which makes the
//! prune-count-insert sequence atomic per key.

use crate::application::ports::{Clock, SharedWindowStore, StoreError, WindowLimits, WindowVerdict};
use crate::domain::timing::unix_seconds;
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Extra lifetime given to a window key beyond its window length.
pub const DEFAULT_EXPIRY_SLACK: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct WindowSlot {
    /// Admitted timestamps in unix seconds, ascending
    entries: Vec<f64>,
    /// Unix seconds after which the whole key is gone
    expires_at: f64,
}

#[derive(Debug)]
struct ValueSlot {
    value: u64,
    expires_at: SystemTime,
}

/// In-memory `SharedWindowStore` backed by sharded maps.
#[derive(Debug)]
pub struct InMemoryWindowStore {
    windows: DashMap<String, WindowSlot, RandomState>,
    values: DashMap<String, ValueSlot, RandomState>,
    clock: Arc<dyn Clock>,
    expiry_slack: Duration,
}

impl InMemoryWindowStore {
    /// Create a store; `clock` drives counter expiry.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::with_hasher(RandomState::new()),
            values: DashMap::with_hasher(RandomState::new()),
            clock,
            expiry_slack: DEFAULT_EXPIRY_SLACK,
        }
    }

    /// Set how long window keys outlive their window.
    pub fn with_expiry_slack(mut self, slack: Duration) -> Self {
        self.expiry_slack = slack;
        self
    }

    /// Number of live keys of any kind.
    pub fn key_count(&self) -> usize {
        self.windows.len() + self.values.len()
    }

    /// Drop keys whose expiry has passed. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let now_secs = unix_seconds(now);
        let before = self.key_count();
        self.windows.retain(|_, slot| slot.expires_at > now_secs);
        self.values.retain(|_, slot| slot.expires_at > now);
        before.saturating_sub(self.key_count())
    }
}

impl SharedWindowStore for InMemoryWindowStore {
    fn check_and_record(
        &self,
        key: &str,
        now: f64,
        limits: WindowLimits,
    ) -> Result<WindowVerdict, StoreError> {
        let mut slot = self.windows.entry(key.to_string()).or_default();

        if slot.expires_at <= now {
            slot.entries.clear();
        }
        let window_start = now - limits.window_seconds;
        slot.entries.retain(|&t| t >= window_start);

        let count = slot.entries.len();
        if count >= limits.capacity as usize {
            return Ok(WindowVerdict::WindowFull {
                count: count as u64,
                oldest: slot.entries.first().copied().unwrap_or(now),
            });
        }

        // Burst range is (now - cooldown, now]
        let burst_start = slot
            .entries
            .partition_point(|&t| t <= now - limits.cooldown_seconds);
        let in_burst = count - burst_start;
        let burst_size = limits.burst_size as usize;
        if in_burst >= burst_size {
            // Entry whose expiry from the burst range frees the first slot
            let pivot = match burst_size {
                0 => now,
                _ => slot.entries[burst_start + in_burst - burst_size],
            };
            return Ok(WindowVerdict::BurstFull {
                count: in_burst as u64,
                pivot,
            });
        }

        let position = slot.entries.partition_point(|&t| t <= now);
        slot.entries.insert(position, now);
        slot.expires_at = now + limits.window_seconds + self.expiry_slack.as_secs_f64();

        Ok(WindowVerdict::Recorded {
            count_before: count as u64,
        })
    }

    fn count_in_range(&self, key: &str, start: f64, end: f64) -> Result<u64, StoreError> {
        let now = unix_seconds(self.clock.now());
        let count = self
            .windows
            .get(key)
            .filter(|slot| slot.expires_at > now)
            .map(|slot| {
                slot.entries
                    .iter()
                    .filter(|&&t| t >= start && t <= end)
                    .count()
            })
            .unwrap_or(0);
        Ok(count as u64)
    }

    fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let mut slot = self.values.entry(key.to_string()).or_insert(ValueSlot {
            value: 0,
            expires_at: now,
        });
        if slot.expires_at <= now {
            slot.value = 0;
        }
        slot.value = slot.value.saturating_add(1);
        slot.expires_at = now + ttl;
        Ok(slot.value)
    }

    fn set_with_ttl(&self, key: &str, value: u64, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = self.clock.now() + ttl;
        self.values
            .insert(key.to_string(), ValueSlot { value, expires_at });
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = self.clock.now();
        Ok(self
            .values
            .get(key)
            .filter(|slot| slot.expires_at > now)
            .map(|slot| slot.value))
    }

    fn delete(&self, keys: &[String]) -> Result<(), StoreError> {
        for key in keys {
            self.windows.remove(key);
            self.values.remove(key);
        }
        Ok(())
    }

    fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::MockClock;

    const T0: f64 = 1_000_000.0;

    fn limits() -> WindowLimits {
        WindowLimits {
            window_seconds: 60.0,
            capacity: 6,
            cooldown_seconds: 10.0,
            burst_size: 3,
        }
    }

    fn store() -> (InMemoryWindowStore, MockClock) {
        let clock = MockClock::at_unix_seconds(1_000_000);
        (InMemoryWindowStore::new(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_burst_then_window() {
        let (store, _) = store();
        let key = "window:state-mutation:U1";

        for (i, t) in [0.0, 1.0, 2.0].into_iter().enumerate() {
            assert_eq!(
                store.check_and_record(key, T0 + t, limits()).unwrap(),
                WindowVerdict::Recorded {
                    count_before: i as u64
                }
            );
        }

        assert_eq!(
            store.check_and_record(key, T0 + 3.0, limits()).unwrap(),
            WindowVerdict::BurstFull {
                count: 3,
                pivot: T0
            }
        );

        for t in [12.0, 13.0, 14.0] {
            assert!(matches!(
                store.check_and_record(key, T0 + t, limits()).unwrap(),
                WindowVerdict::Recorded { .. }
            ));
        }

        assert_eq!(
            store.check_and_record(key, T0 + 15.0, limits()).unwrap(),
            WindowVerdict::WindowFull {
                count: 6,
                oldest: T0
            }
        );
    }

    #[test]
    fn test_burst_slot_frees_at_cooldown_boundary() {
        let (store, _) = store();
        for t in [0.0, 1.0, 2.0] {
            store.check_and_record("k", T0 + t, limits()).unwrap();
        }

        // The T0 entry leaves the burst range exactly 10s later
        assert!(matches!(
            store.check_and_record("k", T0 + 9.5, limits()).unwrap(),
            WindowVerdict::BurstFull { .. }
        ));
        assert_eq!(
            store.check_and_record("k", T0 + 10.0, limits()).unwrap(),
            WindowVerdict::Recorded { count_before: 3 }
        );
    }

    #[test]
    fn test_zero_burst_size_denies_without_panicking() {
        let (store, _) = store();
        let no_burst = WindowLimits {
            burst_size: 0,
            ..limits()
        };
        assert_eq!(
            store.check_and_record("k", T0, no_burst).unwrap(),
            WindowVerdict::BurstFull { count: 0, pivot: T0 }
        );
        assert_eq!(store.count_in_range("k", T0 - 60.0, T0).unwrap(), 0);
    }

    #[test]
    fn test_get_many_in_key_order() {
        let (store, _) = store();
        store.set_with_ttl("a", 1, Duration::from_secs(10)).unwrap();
        store.set_with_ttl("c", 3, Duration::from_secs(10)).unwrap();

        let keys = ["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(store.get_many(&keys).unwrap(), vec![Some(1), None, Some(3)]);
    }

    #[test]
    fn test_old_entries_are_pruned() {
        let (store, _) = store();
        let key = "k";
        for t in 0..3 {
            store.check_and_record(key, T0 + f64::from(t) * 11.0, limits()).unwrap();
        }
        // First entry at T0 is outside [T0+1, T0+61]
        let verdict = store.check_and_record(key, T0 + 61.0, limits()).unwrap();
        assert_eq!(verdict, WindowVerdict::Recorded { count_before: 2 });
    }

    #[test]
    fn test_denials_do_not_record() {
        let (store, _) = store();
        for _ in 0..10 {
            store.check_and_record("k", T0, limits()).unwrap();
        }
        assert_eq!(store.count_in_range("k", T0 - 60.0, T0).unwrap(), 3);
    }

    #[test]
    fn test_counters_expire() {
        let (store, clock) = store();
        let ttl = Duration::from_secs(60);

        assert_eq!(store.incr_with_ttl("v", ttl).unwrap(), 1);
        assert_eq!(store.incr_with_ttl("v", ttl).unwrap(), 2);
        assert_eq!(store.get("v").unwrap(), Some(2));

        clock.advance(Duration::from_secs(61));
        assert_eq!(store.get("v").unwrap(), None);
        assert_eq!(store.incr_with_ttl("v", ttl).unwrap(), 1);
    }

    #[test]
    fn test_set_get_delete() {
        let (store, _) = store();
        store
            .set_with_ttl("at", 42, Duration::from_secs(10))
            .unwrap();
        store.check_and_record("w", T0, limits()).unwrap();
        assert_eq!(store.get("at").unwrap(), Some(42));

        store
            .delete(&["at".to_string(), "w".to_string(), "missing".to_string()])
            .unwrap();
        assert_eq!(store.get("at").unwrap(), None);
        assert_eq!(store.key_count(), 0);
    }

    #[test]
    fn test_purge_expired() {
        let (store, clock) = store();
        store.check_and_record("w", T0, limits()).unwrap();
        store.incr_with_ttl("v", Duration::from_secs(10)).unwrap();
        assert_eq!(store.purge_expired(), 0);

        clock.advance(Duration::from_secs(120));
        assert_eq!(store.purge_expired(), 2);
        assert_eq!(store.key_count(), 0);
    }

    #[test]
    fn test_concurrent_callers_never_exceed_capacity() {
        let (store, _) = store();
        let store = Arc::new(store);
        let wide = WindowLimits {
            window_seconds: 60.0,
            capacity: 50,
            cooldown_seconds: 1.0,
            burst_size: 50,
        };

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| {
                            matches!(
                                store.check_and_record("hot", T0, wide).unwrap(),
                                WindowVerdict::Recorded { .. }
                            )
                        })
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }
}
