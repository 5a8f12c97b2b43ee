//! # tiered-admission
//!
//! Tiered admission control for multi-tenant, command-driven services.
//!
//! Every request belongs to an actor and a [`Category`]. The category selects a
//! [`TierConfig`]: a sliding-window capacity, a burst allowance with a cooldown,
//! and a ceiling for exponential backoff. Read-only queries get generous tiers,
//! state-mutating operations strict ones.
//!
//! ## Quick Start
//!
//! ```rust
//! use tiered_admission::{ActorId, AdmissionController, Category};
//!
//! // Standard tiers, local state only
//! let controller = AdmissionController::standard();
//! let actor = ActorId::from("U1");
//!
//! let decision = controller.check(&actor, Category::StateMutation);
//! if decision.is_denied() {
//!     println!("retry in {:.1}s ({})", decision.retry_after_seconds, decision.reason);
//! }
//! ```
//!
//! ## Dual-Mode Counting
//!
//! - **Shared sliding window**: with a [`SharedWindowStore`] configured, every
//!   check runs one atomic prune-count-insert on the store, so all worker
//!   processes enforce one window per (actor, category).
//! - **Local token bucket**: without a store, or while it is unhealthy, each
//!   process keeps a token bucket per (actor, category) holding `burst_size`
//!   tokens and refilling at `requests_per_window / window_seconds` per second.
//!
//! A failing store never rejects traffic. The failure is logged at warn level,
//! the store is bypassed, and checks continue on local state until a probe
//! finds the store healthy again. Right after failover an actor may get one
//! extra burst through.
//!
//! ```rust
//! use tiered_admission::{AdmissionController, InMemoryWindowStore, StoreHealthConfig, SystemClock};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let store = Arc::new(InMemoryWindowStore::new(Arc::new(SystemClock::new())));
//! let controller = AdmissionController::builder()
//!     .with_shared_store(store)
//!     .with_health_config(StoreHealthConfig {
//!         failure_threshold: 1,
//!         recovery_timeout: Duration::from_secs(30),
//!     })
//!     .build()
//!     .unwrap();
//! assert!(controller.has_shared_store());
//! ```
//!
//! With the `redis-storage` feature, `RedisWindowStore` implements the store
//! on Redis sorted sets.
//!
//! ## Denials and Backoff
//!
//! A denial carries a reason and a suggested wait:
//!
//! - `burst_exceeded`: too many requests within one cooldown; wait at most
//!   `cooldown_seconds`.
//! - `window_exceeded`: the window is used up; wait the longer of the backoff
//!   delay and the time until the window admits again.
//! - `backoff`: the actor is serving a penalty for violations recorded
//!   against this category.
//!
//! Denials do not escalate on their own. The caller decides which denials
//! count as violations and reports them:
//!
//! ```rust
//! use tiered_admission::{ActorId, AdmissionController, Category};
//!
//! let controller = AdmissionController::standard();
//! let actor = ActorId::from("U1");
//!
//! controller.record_violation_for(&actor, Category::StateMutation);
//! // min(cooldown * 2^violations, max_backoff)
//! assert_eq!(controller.backoff(&actor, Category::StateMutation), 20.0);
//!
//! // The penalty blocks mutations only
//! assert!(controller.check(&actor, Category::ReadQuery).is_allowed());
//! assert!(controller.check(&actor, Category::StateMutation).is_denied());
//! ```
//!
//! `record_violation` counts a violation without penalizing any category.
//!
//! Violations are forgotten after an hour without new ones (configurable).
//!
//! ## Configuration
//!
//! Tiers are validated when the catalog is built; an invalid tier is a startup
//! error, never silently corrected. Categories without their own tier use the
//! most permissive configured tier.
//!
//! ```rust
//! use tiered_admission::{AdmissionController, Category, TierConfig};
//!
//! let controller = AdmissionController::builder()
//!     .with_tiers([
//!         TierConfig::new(Category::ReadQuery, 60, 60, 20, 1.0, 30.0).unwrap(),
//!         TierConfig::new(Category::StateMutation, 6, 60, 3, 10.0, 300.0).unwrap(),
//!     ])
//!     .with_exempt_actors(["ops-bot"])
//!     .build()
//!     .unwrap();
//! ```
//!
//! With the `serde` feature, [`TierConfig`] can be read from configuration files.
//!
//! ## Memory Management
//!
//! Local state is created lazily per (actor, category). A [`Reaper`] removes
//! buckets idle for longer than its retention and violation records past their
//! TTL. Retention must cover the slowest tier's refill time, which makes a
//! sweep invisible to actors:
//!
//! ```rust,no_run
//! # use tiered_admission::{AdmissionController, ReaperConfig};
//! # let controller = AdmissionController::standard();
//! let reaper = controller.reaper(ReaperConfig::default()).unwrap();
//! let removed = reaper.sweep();
//! ```
//!
//! With the `async` feature, `Reaper::start` sweeps on a tokio interval and
//! `AdmissionController::spawn_health_probe` restores store health in the
//! background.
//!
//! ## Observability
//!
//! ```rust
//! # use tiered_admission::AdmissionController;
//! # let controller = AdmissionController::standard();
//! let snapshot = controller.metrics().snapshot();
//! println!("Denial rate: {:.2}%", snapshot.denial_rate() * 100.0);
//! println!("Store failures: {}", snapshot.store_failures);
//! ```

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    actor::{ActorId, ActorKey},
    backoff::{backoff_seconds, ViolationRecord, DEFAULT_VIOLATION_TTL},
    decision::{AdmissionDecision, DenialReason},
    tier::{Category, TierConfig, TierError, UnknownCategory},
};

pub use application::{
    catalog::{CatalogError, TierCatalog},
    controller::{AdmissionController, AdmissionControllerBuilder, BuildError, UsageSnapshot},
    health::{HealthState, StoreHealth, StoreHealthConfig},
    local::LocalActorState,
    metrics::{Metrics, MetricsSnapshot},
    ports::{Clock, SharedWindowStore, StoreError, WindowLimits, WindowVerdict},
    reaper::{Reaper, ReaperConfig, ReaperConfigError},
    violations::ViolationTracker,
};

pub use infrastructure::{clock::SystemClock, memory_store::InMemoryWindowStore};

#[cfg(feature = "redis-storage")]
pub use infrastructure::redis_store::{RedisWindowStore, RedisWindowStoreConfig};
