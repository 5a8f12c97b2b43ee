//! Violation counting and backoff lookup.
//!
//! Violations are recorded by the collaborator, never by a denial itself. Each
//! record is written to the local map, and also to the shared store while it
//! is usable, so a penalty survives a failover. Reads merge both sources: the
//! larger count and the later timestamps win, so violations recorded locally
//! during an outage still count once the store is back.
//!
//! The count is per actor. A penalty only blocks the category the violation
//! was recorded against.

use crate::application::failover::SharedPath;
use crate::application::ports::Storage;
use crate::domain::actor::{penalty_key, violation_count_key, violation_time_key, ActorId};
use crate::domain::backoff::{self, backoff_seconds, ViolationRecord};
use crate::domain::tier::{Category, TierConfig};
use crate::domain::timing::{from_unix_seconds, unix_seconds};
use crate::infrastructure::storage::ShardedStorage;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Violation state as seen from one source, or merged from both.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Observed {
    count: u32,
    recorded_at: Option<SystemTime>,
    penalized_since: Option<SystemTime>,
}

impl Observed {
    fn merge(self, other: Observed) -> Observed {
        Observed {
            count: self.count.max(other.count),
            recorded_at: later(self.recorded_at, other.recorded_at),
            penalized_since: later(self.penalized_since, other.penalized_since),
        }
    }
}

fn later(a: Option<SystemTime>, b: Option<SystemTime>) -> Option<SystemTime> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn to_millis(at: SystemTime) -> u64 {
    (unix_seconds(at) * 1000.0) as u64
}

fn from_millis(ms: u64) -> SystemTime {
    from_unix_seconds(ms as f64 / 1000.0)
}

fn saturating_count(count: u64) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Per-actor violation counters with a TTL.
#[derive(Debug, Clone)]
pub struct ViolationTracker {
    records: Arc<ShardedStorage<ActorId, ViolationRecord>>,
    shared: Option<SharedPath>,
    ttl: Duration,
}

impl ViolationTracker {
    pub(crate) fn new(shared: Option<SharedPath>, ttl: Duration) -> Self {
        Self {
            records: Arc::new(ShardedStorage::new()),
            shared,
            ttl,
        }
    }

    /// Inactivity period after which an actor's violations are forgotten.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Record one violation and return the actor's count.
    ///
    /// With a category, that category is penalized from `now`; without one
    /// the violation only escalates future backoff.
    pub fn record_violation(
        &self,
        actor: &ActorId,
        category: Option<Category>,
        now: SystemTime,
    ) -> u32 {
        let local = self.records.with_entry_mut(
            actor.clone(),
            || ViolationRecord::new(now),
            |record| record.record(category, self.ttl, now),
        );

        let shared = self.shared.as_ref().and_then(|shared| {
            shared.call("record_violation", |store| {
                let count = store.incr_with_ttl(&violation_count_key(actor), self.ttl)?;
                store.set_with_ttl(&violation_time_key(actor), to_millis(now), self.ttl)?;
                if let Some(category) = category {
                    store.set_with_ttl(&penalty_key(actor, category), to_millis(now), self.ttl)?;
                }
                Ok(count)
            })
        });

        match shared {
            Some(count) => saturating_count(count).max(local),
            None => local,
        }
    }

    /// Local and shared state merged. `category` adds its penalty start.
    fn observe(&self, actor: &ActorId, category: Option<Category>, now: SystemTime) -> Observed {
        let local = self
            .records
            .inspect(actor, |record| {
                if record.is_expired(self.ttl, now) {
                    return Observed::default();
                }
                Observed {
                    count: record.count,
                    recorded_at: Some(record.recorded_at),
                    penalized_since: category
                        .and_then(|category| record.penalized_since(category, self.ttl, now)),
                }
            })
            .unwrap_or_default();

        let Some(shared) = &self.shared else {
            return local;
        };
        let mut keys = vec![violation_count_key(actor), violation_time_key(actor)];
        keys.extend(category.map(|category| penalty_key(actor, category)));

        let remote = shared
            .call("violation_state", |store| store.get_many(&keys))
            .map(|values| {
                let value = |i: usize| values.get(i).copied().flatten();
                Observed {
                    count: value(0).map(saturating_count).unwrap_or(0),
                    recorded_at: value(1).map(from_millis),
                    penalized_since: value(2).map(from_millis),
                }
            })
            .unwrap_or_default();

        local.merge(remote)
    }

    /// Active violation count and the time of the latest violation.
    pub fn violation_state(&self, actor: &ActorId, now: SystemTime) -> Option<(u32, SystemTime)> {
        let observed = self.observe(actor, None, now);
        (observed.count > 0).then(|| (observed.count, observed.recorded_at.unwrap_or(now)))
    }

    /// Active violation count for `actor`.
    pub fn violation_count(&self, actor: &ActorId, now: SystemTime) -> u32 {
        self.observe(actor, None, now).count
    }

    /// Backoff delay for `actor` under `tier`, in seconds.
    pub fn backoff(&self, actor: &ActorId, tier: &TierConfig, now: SystemTime) -> f64 {
        backoff_seconds(self.violation_count(actor, now), tier)
    }

    /// Seconds of penalty left on `category`, if the actor is penalized there.
    ///
    /// One shared-store read per call.
    pub fn penalty_remaining(
        &self,
        actor: &ActorId,
        category: Category,
        tier: &TierConfig,
        now: SystemTime,
    ) -> Option<f64> {
        let observed = self.observe(actor, Some(category), now);
        let since = observed.penalized_since?;
        backoff::penalty_remaining(observed.count, since, tier, now)
    }

    /// Forget all violations of `actor`, locally and in the shared store.
    pub fn reset(&self, actor: &ActorId) {
        self.records.retain(|id, _| id != actor);
        if let Some(shared) = &self.shared {
            let mut keys = vec![violation_count_key(actor), violation_time_key(actor)];
            keys.extend(
                Category::ALL
                    .into_iter()
                    .map(|category| penalty_key(actor, category)),
            );
            shared.call("reset_violations", |store| store.delete(&keys));
        }
    }

    /// Drop local records whose TTL has passed. Returns the number removed.
    pub fn remove_expired(&self, now: SystemTime) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, record| !record.is_expired(self.ttl, now));
        before.saturating_sub(self.records.len())
    }

    /// Number of actors with a local record.
    pub fn tracked_actors(&self) -> usize {
        self.records.len()
    }
}
