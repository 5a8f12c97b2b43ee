//! In-process token buckets per (actor, category).
//!
//! Used whenever the shared store is absent or bypassed. State is created
//! lazily on first check and only removed by the reaper or an explicit reset.

use crate::application::ports::Storage;
use crate::domain::actor::{ActorId, ActorKey};
use crate::domain::bucket::{BucketOutcome, TokenBucket};
use crate::domain::tier::TierConfig;
use crate::domain::timing::elapsed_seconds;
use crate::infrastructure::storage::ShardedStorage;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Local fallback state. Clones share the same buckets.
#[derive(Debug, Clone, Default)]
pub struct LocalActorState {
    buckets: Arc<ShardedStorage<ActorKey, TokenBucket>>,
}

impl LocalActorState {
    /// Create empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refill the pair's bucket and try to take one token.
    ///
    /// Runs entirely under the key's shard lock.
    pub fn check(&self, key: ActorKey, tier: &TierConfig, now: SystemTime) -> BucketOutcome {
        self.buckets.with_entry_mut(
            key,
            || TokenBucket::full(tier, now),
            |bucket| bucket.try_acquire(tier, now),
        )
    }

    /// Tokens available to the pair at `now`; a full bucket if never seen.
    pub fn available(&self, key: &ActorKey, tier: &TierConfig, now: SystemTime) -> f64 {
        self.buckets
            .inspect(key, |bucket| bucket.available(tier, now))
            .unwrap_or(tier.burst_size() as f64)
    }

    /// Drop every bucket belonging to `actor`. Returns the number removed.
    pub fn remove_actor(&self, actor: &ActorId) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|key, _| key.actor != *actor);
        before.saturating_sub(self.buckets.len())
    }

    /// Drop buckets idle for at least `retention`. Returns the number removed.
    pub fn remove_idle(&self, retention: Duration, now: SystemTime) -> usize {
        let horizon = retention.as_secs_f64();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| elapsed_seconds(bucket.last_activity(), now) < horizon);
        before.saturating_sub(self.buckets.len())
    }

    /// Number of tracked (actor, category) pairs.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no pair is tracked.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tier::Category;
    use std::thread;
    use std::time::UNIX_EPOCH;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_000_000 + secs)
    }

    fn key(actor: &str, category: Category) -> ActorKey {
        ActorKey::new(ActorId::from(actor), category)
    }

    #[test]
    fn test_lazy_creation_and_isolation() {
        let state = LocalActorState::new();
        let tier = TierConfig::standard(Category::StateMutation);
        assert!(state.is_empty());
        assert_eq!(state.available(&key("U1", Category::StateMutation), &tier, at(0)), 3.0);

        for _ in 0..3 {
            assert_eq!(
                state.check(key("U1", Category::StateMutation), &tier, at(0)),
                BucketOutcome::Acquired
            );
        }
        assert!(matches!(
            state.check(key("U1", Category::StateMutation), &tier, at(0)),
            BucketOutcome::CoolingDown { .. }
        ));

        // Another actor and another category are untouched
        assert_eq!(
            state.check(key("U2", Category::StateMutation), &tier, at(0)),
            BucketOutcome::Acquired
        );
        assert_eq!(
            state.check(key("U1", Category::ReadQuery), &tier, at(0)),
            BucketOutcome::Acquired
        );
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn test_remove_actor() {
        let state = LocalActorState::new();
        let tier = TierConfig::standard(Category::ReadQuery);
        state.check(key("U1", Category::ReadQuery), &tier, at(0));
        state.check(key("U1", Category::StateMutation), &tier, at(0));
        state.check(key("U2", Category::ReadQuery), &tier, at(0));

        assert_eq!(state.remove_actor(&ActorId::from("U1")), 2);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_remove_idle() {
        let state = LocalActorState::new();
        let tier = TierConfig::standard(Category::ReadQuery);
        state.check(key("old", Category::ReadQuery), &tier, at(0));
        state.check(key("new", Category::ReadQuery), &tier, at(500));

        assert_eq!(state.remove_idle(Duration::from_secs(600), at(500)), 0);
        assert_eq!(state.remove_idle(Duration::from_secs(600), at(700)), 1);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_concurrent_checks_respect_burst() {
        let state = LocalActorState::new();
        let tier = TierConfig::standard(Category::ReadQuery);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                let tier = tier.clone();
                thread::spawn(move || {
                    (0..10)
                        .filter(|_| {
                            state.check(key("hot", Category::ReadQuery), &tier, at(0))
                                == BucketOutcome::Acquired
                        })
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, tier.burst_size() as usize);
    }
}
