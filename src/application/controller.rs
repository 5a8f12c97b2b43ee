//! Admission control coordination logic.
//!
//! The controller decides whether a request may proceed. It consults the
//! shared sliding window while the shared store is usable and the local token
//! bucket otherwise, and applies violation backoff on top of both.

use crate::application::catalog::{CatalogError, TierCatalog};
use crate::application::failover::SharedPath;
use crate::application::health::{HealthState, SharedStoreHealth, StoreHealth, StoreHealthConfig};
use crate::application::local::LocalActorState;
use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, SharedWindowStore, WindowLimits, WindowVerdict};
use crate::application::reaper::{Reaper, ReaperConfig, ReaperConfigError};
use crate::application::violations::ViolationTracker;
use crate::domain::actor::{ActorId, ActorKey};
use crate::domain::backoff::DEFAULT_VIOLATION_TTL;
use crate::domain::bucket::BucketOutcome;
use crate::domain::decision::{AdmissionDecision, DenialReason};
use crate::domain::tier::{Category, TierConfig};
use crate::domain::timing::unix_seconds;
use crate::infrastructure::clock::SystemClock;
use ahash::RandomState;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Added to window and burst waits so that the blocking entry has left its
/// range when the caller comes back.
const RETRY_MARGIN_SECONDS: f64 = 0.001;

/// Error returned when the controller cannot be built.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    /// The tier catalog is invalid
    Catalog(CatalogError),
    /// Health tracking needs at least one failure to trip
    ZeroFailureThreshold,
    /// Violations must be remembered for some time
    ZeroViolationTtl,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Catalog(e) => write!(f, "invalid tier catalog: {}", e),
            BuildError::ZeroFailureThreshold => {
                write!(f, "store failure threshold must be greater than 0")
            }
            BuildError::ZeroViolationTtl => write!(f, "violation ttl must be greater than 0"),
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuildError::Catalog(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CatalogError> for BuildError {
    fn from(e: CatalogError) -> Self {
        BuildError::Catalog(e)
    }
}

/// Current usage of one (actor, category) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageSnapshot {
    /// Category the usage belongs to
    pub category: Category,
    /// Window capacity on the shared path, burst size on the local path
    pub limit: u32,
    /// Requests counted against `limit`
    pub used: u32,
    /// Requests left before a denial
    pub remaining: u32,
    /// Whether the figures come from local fallback state
    pub degraded: bool,
}

/// Tiered admission controller.
///
/// Construct once at startup and share it; clones share all state.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    catalog: Arc<TierCatalog>,
    clock: Arc<dyn Clock>,
    local: LocalActorState,
    violations: ViolationTracker,
    shared: Option<SharedPath>,
    health: SharedStoreHealth,
    metrics: Metrics,
    exempt: Arc<HashSet<ActorId, RandomState>>,
}

impl AdmissionController {
    /// Start building a controller.
    pub fn builder() -> AdmissionControllerBuilder {
        AdmissionControllerBuilder::new()
    }

    /// Local-only controller with the standard tiers and the system clock.
    pub fn standard() -> Self {
        let health = Arc::new(StoreHealth::new());
        Self::assemble(
            TierCatalog::standard(),
            Arc::new(SystemClock::new()),
            None,
            health,
            DEFAULT_VIOLATION_TTL,
            HashSet::default(),
        )
    }

    fn assemble(
        catalog: TierCatalog,
        clock: Arc<dyn Clock>,
        store: Option<Arc<dyn SharedWindowStore>>,
        health: SharedStoreHealth,
        violation_ttl: Duration,
        exempt: HashSet<ActorId, RandomState>,
    ) -> Self {
        let metrics = Metrics::new();
        let shared = store.map(|store| SharedPath::new(store, Arc::clone(&health), metrics.clone()));
        Self {
            catalog: Arc::new(catalog),
            clock,
            local: LocalActorState::new(),
            violations: ViolationTracker::new(shared.clone(), violation_ttl),
            shared,
            health,
            metrics,
            exempt: Arc::new(exempt),
        }
    }

    /// Decide whether `actor` may run a request of `category` now.
    ///
    /// Never fails: store problems degrade to local state and unknown
    /// categories use the most permissive tier.
    pub fn check(&self, actor: &ActorId, category: Category) -> AdmissionDecision {
        self.check_at(actor, category, self.clock.now())
    }

    /// Like [`check`](Self::check), for a raw category name.
    ///
    /// Unknown names are counted under the most permissive tier's category.
    pub fn check_named(&self, actor: &ActorId, category: &str) -> AdmissionDecision {
        let category = category
            .parse::<Category>()
            .unwrap_or_else(|_| self.catalog.most_permissive().category());
        self.check(actor, category)
    }

    /// Decide at an explicit point in time.
    pub fn check_at(
        &self,
        actor: &ActorId,
        category: Category,
        now: SystemTime,
    ) -> AdmissionDecision {
        let tier = self.catalog.get_tier(category);
        let decision = self.decide(actor, category, tier, now);

        self.metrics.record_decision(&decision);
        if decision.is_denied() {
            tracing::debug!(
                actor = %actor,
                category = %category,
                reason = %decision.reason,
                retry_after = decision.retry_after_seconds,
                "Admission denied"
            );
        }
        decision
    }

    fn decide(
        &self,
        actor: &ActorId,
        category: Category,
        tier: &TierConfig,
        now: SystemTime,
    ) -> AdmissionDecision {
        if self.exempt.contains(actor) {
            return AdmissionDecision::allow();
        }

        if let Some(remaining) = self
            .violations
            .penalty_remaining(actor, category, tier, now)
        {
            return AdmissionDecision::deny(DenialReason::Backoff, remaining);
        }

        let key = ActorKey::new(actor.clone(), category);
        if let Some(decision) = self.check_shared(&key, tier, now) {
            return decision;
        }
        self.check_local(key, tier, now)
    }

    /// Shared sliding window; `None` if the store is bypassed or failed.
    fn check_shared(
        &self,
        key: &ActorKey,
        tier: &TierConfig,
        now: SystemTime,
    ) -> Option<AdmissionDecision> {
        let shared = self.shared.as_ref()?;
        let now_secs = unix_seconds(now);
        let limits = WindowLimits::from(tier);

        let verdict = shared.call("check_and_record", |store| {
            store.check_and_record(&key.window_key(), now_secs, limits)
        })?;

        Some(match verdict {
            WindowVerdict::Recorded { .. } => AdmissionDecision::allow(),
            WindowVerdict::WindowFull { oldest, .. } => {
                let until_free = (oldest + limits.window_seconds - now_secs)
                    .clamp(0.0, limits.window_seconds);
                self.window_denial(&key.actor, tier, now, until_free)
            }
            WindowVerdict::BurstFull { pivot, .. } => {
                // A slot frees once its entry is exactly `cooldown` old
                let cooldown = tier.cooldown_seconds();
                let until_free = (pivot + cooldown - now_secs + RETRY_MARGIN_SECONDS)
                    .clamp(RETRY_MARGIN_SECONDS, cooldown.max(RETRY_MARGIN_SECONDS));
                AdmissionDecision::deny(DenialReason::BurstExceeded, until_free)
            }
        })
    }

    fn check_local(&self, key: ActorKey, tier: &TierConfig, now: SystemTime) -> AdmissionDecision {
        let actor = key.actor.clone();
        match self.local.check(key, tier, now) {
            BucketOutcome::Acquired => AdmissionDecision::allow(),
            BucketOutcome::CoolingDown {
                retry_after_seconds,
            } => AdmissionDecision::deny(DenialReason::BurstExceeded, retry_after_seconds),
            BucketOutcome::Exhausted { next_token_seconds } => {
                self.window_denial(&actor, tier, now, next_token_seconds)
            }
        }
    }

    /// Window denial waits out the longer of backoff and the window itself.
    fn window_denial(
        &self,
        actor: &ActorId,
        tier: &TierConfig,
        now: SystemTime,
        until_free: f64,
    ) -> AdmissionDecision {
        let backoff = self.violations.backoff(actor, tier, now);
        AdmissionDecision::deny(
            DenialReason::WindowExceeded,
            backoff.max(until_free + RETRY_MARGIN_SECONDS),
        )
    }

    /// Count one violation against `actor`, escalating future backoff.
    ///
    /// No category is penalized; see
    /// [`record_violation_for`](Self::record_violation_for). Returns the
    /// actor's violation count.
    pub fn record_violation(&self, actor: &ActorId) -> u32 {
        self.record_violation_at(actor, None, self.clock.now())
    }

    /// Count one violation and penalize `category` for the backoff delay.
    ///
    /// Checks of other categories are not blocked, though their window
    /// denials still escalate with the actor's count. Returns the actor's
    /// violation count.
    pub fn record_violation_for(&self, actor: &ActorId, category: Category) -> u32 {
        self.record_violation_at(actor, Some(category), self.clock.now())
    }

    /// Record a violation at an explicit point in time.
    pub fn record_violation_at(
        &self,
        actor: &ActorId,
        category: Option<Category>,
        now: SystemTime,
    ) -> u32 {
        let count = self.violations.record_violation(actor, category, now);
        self.metrics.record_violation();
        match category {
            Some(category) => tracing::debug!(
                actor = %actor,
                category = %category,
                violations = count,
                "Violation recorded"
            ),
            None => tracing::debug!(actor = %actor, violations = count, "Violation recorded"),
        }
        count
    }

    /// Current backoff delay for `actor` under the tier of `category`.
    pub fn backoff(&self, actor: &ActorId, category: Category) -> f64 {
        let tier = self.catalog.get_tier(category);
        self.violations.backoff(actor, tier, self.clock.now())
    }

    /// Current usage of one (actor, category) pair. Read-only.
    pub fn usage(&self, actor: &ActorId, category: Category) -> UsageSnapshot {
        let tier = self.catalog.get_tier(category);
        let now = self.clock.now();
        let key = ActorKey::new(actor.clone(), category);

        let shared = self.shared.as_ref().and_then(|shared| {
            let now_secs = unix_seconds(now);
            let window = tier.window_seconds() as f64;
            shared.call("count_in_range", |store| {
                store.count_in_range(&key.window_key(), now_secs - window, now_secs)
            })
        });

        match shared {
            Some(count) => {
                let limit = tier.requests_per_window();
                let used = u32::try_from(count).unwrap_or(u32::MAX).min(limit);
                UsageSnapshot {
                    category,
                    limit,
                    used,
                    remaining: limit - used,
                    degraded: false,
                }
            }
            None => {
                let limit = tier.burst_size();
                let available = self.local.available(&key, tier, now).floor() as u32;
                let remaining = available.min(limit);
                UsageSnapshot {
                    category,
                    limit,
                    used: limit - remaining,
                    remaining,
                    degraded: self.shared.is_some(),
                }
            }
        }
    }

    /// Forget everything known about `actor`: buckets, windows, violations.
    ///
    /// Shared keys are deleted best-effort.
    pub fn reset_actor(&self, actor: &ActorId) {
        self.local.remove_actor(actor);
        self.violations.reset(actor);
        if let Some(shared) = &self.shared {
            let keys: Vec<String> = Category::ALL
                .into_iter()
                .map(|category| ActorKey::new(actor.clone(), category).window_key())
                .collect();
            shared.call("reset_windows", |store| store.delete(&keys));
        }
        tracing::debug!(actor = %actor, "Actor state reset");
    }

    /// Ping the shared store if a recovery attempt is due.
    ///
    /// Returns the health state afterwards.
    pub fn probe_shared_store(&self) -> HealthState {
        if let Some(shared) = &self.shared {
            shared.probe();
        }
        self.health.state()
    }

    /// Start a background task that probes the shared store every `interval`
    /// while it is unhealthy, so health returns without waiting for traffic.
    ///
    /// Returns `None` when no shared store is configured. Must be called from
    /// within a tokio runtime.
    #[cfg(feature = "async")]
    pub fn spawn_health_probe(&self, interval: Duration) -> Option<tokio::task::JoinHandle<()>> {
        let shared = self.shared.clone()?;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                ticker.tick().await;
                if !shared.is_healthy() {
                    shared.probe();
                }
            }
        }))
    }

    /// Build a reaper over this controller's local state.
    ///
    /// # Errors
    /// Returns `ReaperConfigError::RetentionTooShort` if the retention horizon
    /// is shorter than the slowest tier needs to refill, which would make
    /// reaping visible to actors.
    pub fn reaper(&self, config: ReaperConfig) -> Result<Reaper, ReaperConfigError> {
        Reaper::new(
            self.local.clone(),
            self.violations.clone(),
            Arc::clone(&self.clock),
            self.metrics.clone(),
            config,
            self.catalog.slowest_full_refill_seconds(),
        )
    }

    /// The tier catalog.
    pub fn catalog(&self) -> &TierCatalog {
        &self.catalog
    }

    /// Admission metrics. Clones share counters.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Shared store health tracker.
    pub fn health(&self) -> &StoreHealth {
        &self.health
    }

    /// Whether checks currently use local fallback state.
    pub fn is_degraded(&self) -> bool {
        match &self.shared {
            Some(shared) => !shared.is_healthy(),
            None => false,
        }
    }

    /// Whether a shared store is configured.
    pub fn has_shared_store(&self) -> bool {
        self.shared.is_some()
    }

    /// Local fallback state.
    pub fn local_state(&self) -> &LocalActorState {
        &self.local
    }

    /// Violation tracker.
    pub fn violations(&self) -> &ViolationTracker {
        &self.violations
    }
}

/// Builder for [`AdmissionController`].
#[derive(Debug)]
pub struct AdmissionControllerBuilder {
    tiers: Option<Vec<TierConfig>>,
    catalog: Option<TierCatalog>,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<dyn SharedWindowStore>>,
    health_config: StoreHealthConfig,
    violation_ttl: Duration,
    exempt: HashSet<ActorId, RandomState>,
}

impl AdmissionControllerBuilder {
    fn new() -> Self {
        Self {
            tiers: None,
            catalog: None,
            clock: None,
            store: None,
            health_config: StoreHealthConfig::default(),
            violation_ttl: DEFAULT_VIOLATION_TTL,
            exempt: HashSet::default(),
        }
    }

    /// Use an already validated catalog.
    pub fn with_catalog(mut self, catalog: TierCatalog) -> Self {
        self.catalog = Some(catalog);
        self.tiers = None;
        self
    }

    /// Build the catalog from tiers; validated in [`build`](Self::build).
    pub fn with_tiers(mut self, tiers: impl IntoIterator<Item = TierConfig>) -> Self {
        self.tiers = Some(tiers.into_iter().collect());
        self.catalog = None;
        self
    }

    /// Use a custom clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Coordinate through a shared store.
    pub fn with_shared_store(mut self, store: Arc<dyn SharedWindowStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Configure failover and recovery of the shared store.
    pub fn with_health_config(mut self, config: StoreHealthConfig) -> Self {
        self.health_config = config;
        self
    }

    /// Inactivity period after which violations are forgotten.
    pub fn with_violation_ttl(mut self, ttl: Duration) -> Self {
        self.violation_ttl = ttl;
        self
    }

    /// Actors that bypass admission control entirely.
    pub fn with_exempt_actors<I, A>(mut self, actors: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ActorId>,
    {
        self.exempt.extend(actors.into_iter().map(Into::into));
        self
    }

    /// Validate and build the controller.
    ///
    /// # Errors
    /// Returns `BuildError` for an invalid catalog or configuration.
    pub fn build(self) -> Result<AdmissionController, BuildError> {
        if self.health_config.failure_threshold == 0 {
            return Err(BuildError::ZeroFailureThreshold);
        }
        if self.violation_ttl.is_zero() {
            return Err(BuildError::ZeroViolationTtl);
        }

        let catalog = match (self.catalog, self.tiers) {
            (_, Some(tiers)) => TierCatalog::new(tiers)?,
            (Some(catalog), None) => catalog,
            (None, None) => TierCatalog::standard(),
        };
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()));
        let health = Arc::new(StoreHealth::with_config(self.health_config));

        Ok(AdmissionController::assemble(
            catalog,
            clock,
            self.store,
            health,
            self.violation_ttl,
            self.exempt,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_store::InMemoryWindowStore;
    use crate::infrastructure::mocks::{FlakyStore, MockClock};
    use std::time::UNIX_EPOCH;

    fn start() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_000_000)
    }

    fn scenario_tier() -> TierConfig {
        TierConfig::new(Category::StateMutation, 6, 60, 3, 10.0, 300.0).unwrap()
    }

    fn local_controller(clock: &MockClock) -> AdmissionController {
        AdmissionController::builder()
            .with_tiers([scenario_tier()])
            .with_clock(Arc::new(clock.clone()))
            .build()
            .unwrap()
    }

    fn shared_controller(clock: &MockClock) -> (AdmissionController, FlakyStore) {
        let inner = Arc::new(InMemoryWindowStore::new(Arc::new(clock.clone())));
        let flaky = FlakyStore::new(inner);
        let controller = AdmissionController::builder()
            .with_tiers([scenario_tier()])
            .with_clock(Arc::new(clock.clone()))
            .with_shared_store(Arc::new(flaky.clone()))
            .build()
            .unwrap();
        (controller, flaky)
    }

    fn check(controller: &AdmissionController, clock: &MockClock, t: u64) -> AdmissionDecision {
        clock.set(start() + Duration::from_secs(t));
        controller.check(&ActorId::from("U1"), Category::StateMutation)
    }

    #[test]
    fn test_shared_path_scenario() {
        let clock = MockClock::new(start());
        let (controller, _) = shared_controller(&clock);

        for t in [0, 1, 2] {
            assert!(check(&controller, &clock, t).is_allowed(), "t={}", t);
        }

        let burst = check(&controller, &clock, 3);
        assert_eq!(burst.reason, DenialReason::BurstExceeded);
        assert!((burst.retry_after_seconds - 7.0).abs() < 0.01);

        for t in [12, 13, 14] {
            assert!(check(&controller, &clock, t).is_allowed(), "t={}", t);
        }

        let window = check(&controller, &clock, 15);
        assert_eq!(window.reason, DenialReason::WindowExceeded);
        // Oldest entry (t=0) leaves the window at t=60
        assert!(window.retry_after_seconds >= 45.0);

        assert_eq!(controller.record_violation(&ActorId::from("U1")), 1);
        assert_eq!(
            controller.backoff(&ActorId::from("U1"), Category::StateMutation),
            20.0
        );
        assert!(!controller.is_degraded());
    }

    #[test]
    fn test_local_path_burst_and_window() {
        let clock = MockClock::new(start());
        let controller = local_controller(&clock);

        for t in [0, 1, 2] {
            assert!(check(&controller, &clock, t).is_allowed(), "t={}", t);
        }

        let burst = check(&controller, &clock, 3);
        assert_eq!(burst.reason, DenialReason::BurstExceeded);
        assert!((burst.retry_after_seconds - 9.0).abs() < 1e-6);

        // One token per 10s: after a quiet cooldown a token is back
        assert!(check(&controller, &clock, 13).is_allowed());
    }

    #[test]
    fn test_local_window_denial_can_be_waited_out() {
        let clock = MockClock::new(start());
        // One token per 100s, far slower than the cooldown
        let slow = TierConfig::new(Category::StateMutation, 6, 600, 3, 10.0, 300.0).unwrap();
        let controller = AdmissionController::builder()
            .with_tiers([slow])
            .with_clock(Arc::new(clock.clone()))
            .build()
            .unwrap();

        for t in [0, 1, 2] {
            assert!(check(&controller, &clock, t).is_allowed(), "t={}", t);
        }

        let denied = check(&controller, &clock, 15);
        assert_eq!(denied.reason, DenialReason::WindowExceeded);
        assert!((denied.retry_after_seconds - 85.0).abs() < 0.01);

        clock.advance(denied.retry_after());
        assert!(controller
            .check(&ActorId::from("U1"), Category::StateMutation)
            .is_allowed());
    }

    #[test]
    fn test_penalty_denies_with_backoff_reason() {
        let clock = MockClock::new(start());
        let controller = local_controller(&clock);
        let actor = ActorId::from("U1");

        controller.record_violation_for(&actor, Category::StateMutation);
        clock.advance(Duration::from_secs(5));

        let decision = controller.check(&actor, Category::StateMutation);
        assert_eq!(decision.reason, DenialReason::Backoff);
        assert!((decision.retry_after_seconds - 15.0).abs() < 1e-6);

        clock.advance(Duration::from_secs(15));
        assert!(controller.check(&actor, Category::StateMutation).is_allowed());
        assert_eq!(controller.metrics().denied_backoff(), 1);
    }

    #[test]
    fn test_mutation_penalty_leaves_reads_alone() {
        let clock = MockClock::new(start());
        let controller = AdmissionController::builder()
            .with_clock(Arc::new(clock.clone()))
            .build()
            .unwrap();
        let actor = ActorId::from("U1");

        assert_eq!(controller.record_violation_for(&actor, Category::StateMutation), 1);
        assert!(controller.check(&actor, Category::ReadQuery).is_allowed());
        assert_eq!(
            controller.check(&actor, Category::StateMutation).reason,
            DenialReason::Backoff
        );

        // A count-only violation blocks nothing
        let other = ActorId::from("U2");
        controller.record_violation(&other);
        assert!(controller.check(&other, Category::StateMutation).is_allowed());
        assert_eq!(controller.backoff(&other, Category::StateMutation), 20.0);
    }

    #[test]
    fn test_waiting_out_shared_burst_denial_admits() {
        let clock = MockClock::new(start());
        let (controller, _) = shared_controller(&clock);
        let actor = ActorId::from("U1");

        for t in [0, 1, 2] {
            assert!(check(&controller, &clock, t).is_allowed(), "t={}", t);
        }
        let denied = check(&controller, &clock, 3);
        assert_eq!(denied.reason, DenialReason::BurstExceeded);
        assert!(denied.retry_after_seconds > 7.0);

        clock.advance(denied.retry_after());
        assert!(controller.check(&actor, Category::StateMutation).is_allowed());
    }

    #[test]
    fn test_same_instant_burst_denial_waits_full_cooldown() {
        let clock = MockClock::new(start());
        let (controller, _) = shared_controller(&clock);
        let actor = ActorId::from("U1");

        for _ in 0..3 {
            assert!(controller.check(&actor, Category::StateMutation).is_allowed());
        }
        let denied = controller.check(&actor, Category::StateMutation);
        assert_eq!(denied.reason, DenialReason::BurstExceeded);
        assert!(denied.retry_after_seconds > 0.0);
        assert!(denied.retry_after_seconds <= 10.0);

        clock.advance(denied.retry_after());
        assert!(controller.check(&actor, Category::StateMutation).is_allowed());
    }

    #[test]
    fn test_exempt_actor_is_always_admitted() {
        let clock = MockClock::new(start());
        let controller = AdmissionController::builder()
            .with_tiers([scenario_tier()])
            .with_clock(Arc::new(clock.clone()))
            .with_exempt_actors(["admin"])
            .build()
            .unwrap();

        let admin = ActorId::from("admin");
        for _ in 0..50 {
            assert!(controller.check(&admin, Category::StateMutation).is_allowed());
        }
        assert!(controller.local_state().is_empty());
        assert_eq!(controller.metrics().admitted(), 50);
    }

    #[test]
    fn test_failover_mid_sequence() {
        let clock = MockClock::new(start());
        let (controller, flaky) = shared_controller(&clock);
        let actor = ActorId::from("U1");

        assert!(controller.check(&actor, Category::StateMutation).is_allowed());
        flaky.fail();

        // Local bucket starts full: at most one extra burst slips through
        let admitted = (0..10)
            .filter(|_| controller.check(&actor, Category::StateMutation).is_allowed())
            .count();
        assert_eq!(admitted, 3);
        assert!(controller.is_degraded());
        assert_eq!(controller.metrics().store_failures(), 1);
        assert_eq!(controller.health().state(), HealthState::Unhealthy);
    }

    #[test]
    fn test_unknown_category_name_uses_most_permissive_tier() {
        let clock = MockClock::new(start());
        let controller = AdmissionController::builder()
            .with_clock(Arc::new(clock.clone()))
            .build()
            .unwrap();
        let actor = ActorId::from("U1");

        let admitted = (0..20)
            .filter(|_| controller.check_named(&actor, "launch-rockets").is_allowed())
            .count();
        assert_eq!(
            admitted,
            controller.catalog().most_permissive().burst_size() as usize
        );
    }

    #[test]
    fn test_usage_snapshot() {
        let clock = MockClock::new(start());
        let (controller, flaky) = shared_controller(&clock);
        let actor = ActorId::from("U1");

        controller.check(&actor, Category::StateMutation);
        controller.check(&actor, Category::StateMutation);

        let usage = controller.usage(&actor, Category::StateMutation);
        assert_eq!(
            usage,
            UsageSnapshot {
                category: Category::StateMutation,
                limit: 6,
                used: 2,
                remaining: 4,
                degraded: false,
            }
        );

        flaky.fail();
        let usage = controller.usage(&actor, Category::StateMutation);
        assert!(usage.degraded);
        assert_eq!(usage.limit, 3);
        assert_eq!(usage.remaining, 3);
    }

    #[test]
    fn test_reset_actor() {
        let clock = MockClock::new(start());
        let (controller, _) = shared_controller(&clock);
        let actor = ActorId::from("U1");

        for _ in 0..4 {
            controller.check(&actor, Category::StateMutation);
        }
        controller.record_violation(&actor);
        assert!(controller.check(&actor, Category::StateMutation).is_denied());

        controller.reset_actor(&actor);
        assert!(controller.check(&actor, Category::StateMutation).is_allowed());
        assert_eq!(controller.violations().violation_count(&actor, clock.now()), 0);
    }

    #[test]
    fn test_build_errors() {
        let result = AdmissionController::builder()
            .with_tiers(Vec::new())
            .build();
        assert_eq!(result.unwrap_err(), BuildError::Catalog(CatalogError::Empty));

        let result = AdmissionController::builder()
            .with_health_config(StoreHealthConfig {
                failure_threshold: 0,
                recovery_timeout: Duration::from_secs(1),
            })
            .build();
        assert_eq!(result.unwrap_err(), BuildError::ZeroFailureThreshold);

        let result = AdmissionController::builder()
            .with_violation_ttl(Duration::ZERO)
            .build();
        assert_eq!(result.unwrap_err(), BuildError::ZeroViolationTtl);
    }
}
