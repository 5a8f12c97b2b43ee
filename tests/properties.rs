//! Behavioural guarantees that hold for any tier and either counting path.

mod common;

use common::{mutation_tier, OutageStore, TestClock};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tiered_admission::{
    backoff_seconds, ActorId, AdmissionController, Category, DenialReason, HealthState,
    InMemoryWindowStore, ReaperConfig, StoreHealthConfig, TierConfig,
};

fn controller(clock: &TestClock, tier: TierConfig, shared: bool) -> AdmissionController {
    let builder = AdmissionController::builder()
        .with_tiers([tier])
        .with_clock(Arc::new(clock.clone()));
    let builder = if shared {
        builder.with_shared_store(Arc::new(InMemoryWindowStore::new(Arc::new(clock.clone()))))
    } else {
        builder
    };
    builder.build().unwrap()
}

#[test]
fn test_instant_checks_up_to_capacity() {
    for shared in [true, false] {
        let clock = TestClock::start();
        let tier = TierConfig::new(Category::ReadQuery, 5, 60, 5, 1.0, 60.0).unwrap();
        let controller = controller(&clock, tier, shared);
        let actor = ActorId::from("reader");

        for i in 0..5 {
            assert!(
                controller.check(&actor, Category::ReadQuery).is_allowed(),
                "check {} shared={}",
                i,
                shared
            );
        }
        let denied = controller.check(&actor, Category::ReadQuery);
        assert!(denied.is_denied(), "shared={}", shared);
        assert!(denied.retry_after_seconds > 0.0);
    }
}

#[test]
fn test_burst_denial_within_cooldown() {
    for shared in [true, false] {
        let clock = TestClock::start();
        let controller = controller(&clock, mutation_tier(), shared);
        let actor = ActorId::from("U1");

        for _ in 0..3 {
            assert!(controller.check(&actor, Category::StateMutation).is_allowed());
        }
        clock.advance(Duration::from_secs(4));

        let denied = controller.check(&actor, Category::StateMutation);
        assert_eq!(denied.reason, DenialReason::BurstExceeded, "shared={}", shared);
        assert!(denied.retry_after_seconds > 0.0);
        assert!(denied.retry_after_seconds <= 10.0);
    }
}

#[test]
fn test_waiting_out_window_denial_admits() {
    // One token per 100s on the local path, so the window binds before the burst
    let tier = TierConfig::new(Category::StateMutation, 6, 600, 3, 10.0, 300.0).unwrap();

    for shared in [true, false] {
        let clock = TestClock::start();
        let controller = controller(&clock, tier.clone(), shared);
        let actor = ActorId::from("U1");
        let mut window_denials = 0;

        for _ in 0..40 {
            let decision = controller.check(&actor, Category::StateMutation);
            if decision.is_allowed() {
                clock.advance(Duration::from_secs(4));
                continue;
            }

            clock.advance(decision.retry_after());
            if decision.reason == DenialReason::WindowExceeded {
                window_denials += 1;
                assert!(
                    controller.check(&actor, Category::StateMutation).is_allowed(),
                    "shared={}",
                    shared
                );
            }
        }
        assert!(window_denials > 0, "shared={}", shared);
    }
}

#[test]
fn test_actors_are_isolated() {
    let clock = TestClock::start();
    let controller = controller(&clock, mutation_tier(), false);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let controller = controller.clone();
            thread::spawn(move || {
                let actor = ActorId::new(format!("actor-{}", i));
                (0..20)
                    .filter(|_| controller.check(&actor, Category::StateMutation).is_allowed())
                    .count()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 3);
    }
    assert_eq!(controller.local_state().len(), 8);
}

#[test]
fn test_categories_are_isolated() {
    let clock = TestClock::start();
    let controller = AdmissionController::builder()
        .with_clock(Arc::new(clock.clone()))
        .build()
        .unwrap();
    let actor = ActorId::from("U1");

    while controller.check(&actor, Category::StateMutation).is_allowed() {}
    assert!(controller.check(&actor, Category::ReadQuery).is_allowed());
}

#[test]
fn test_backoff_is_monotone_and_bounded() {
    let tier = mutation_tier();
    let mut previous = 0.0;
    for violations in 0..64 {
        let delay = backoff_seconds(violations, &tier);
        assert!(delay >= previous);
        assert!(delay <= tier.max_backoff_seconds());
        previous = delay;
    }
    assert_eq!(backoff_seconds(1, &tier), 20.0);
    assert_eq!(backoff_seconds(10, &tier), 300.0);
}

#[test]
fn test_violations_expire_after_ttl() {
    let clock = TestClock::start();
    let controller = AdmissionController::builder()
        .with_tiers([mutation_tier()])
        .with_clock(Arc::new(clock.clone()))
        .with_violation_ttl(Duration::from_secs(600))
        .build()
        .unwrap();
    let actor = ActorId::from("U1");

    controller.record_violation(&actor);
    controller.record_violation(&actor);
    assert_eq!(controller.backoff(&actor, Category::StateMutation), 40.0);

    clock.advance(Duration::from_secs(600));
    assert_eq!(controller.backoff(&actor, Category::StateMutation), 10.0);
    assert_eq!(controller.record_violation(&actor), 1);
}

#[test]
fn test_failover_admits_at_most_one_extra_burst() {
    let clock = TestClock::start();
    let store = OutageStore::new(Arc::new(InMemoryWindowStore::new(Arc::new(clock.clone()))));
    let controller = AdmissionController::builder()
        .with_tiers([mutation_tier()])
        .with_clock(Arc::new(clock.clone()))
        .with_shared_store(Arc::new(store.clone()))
        .with_health_config(StoreHealthConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(50),
        })
        .build()
        .unwrap();
    let actor = ActorId::from("U1");

    let before = (0..10)
        .filter(|_| controller.check(&actor, Category::StateMutation).is_allowed())
        .count();
    assert_eq!(before, 3);

    store.go_down();
    let during = (0..10)
        .filter(|_| controller.check(&actor, Category::StateMutation).is_allowed())
        .count();
    assert!(during <= 3);
    assert_eq!(controller.health().state(), HealthState::Unhealthy);

    store.come_back();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(controller.probe_shared_store(), HealthState::Healthy);

    // Back on the shared window, which still holds the first burst
    let after = controller.check(&actor, Category::StateMutation);
    assert_eq!(after.reason, DenialReason::BurstExceeded);
}

#[test]
fn test_violation_recorded_during_outage_outlives_recovery() {
    let clock = TestClock::start();
    let store = OutageStore::new(Arc::new(InMemoryWindowStore::new(Arc::new(clock.clone()))));
    let controller = AdmissionController::builder()
        .with_tiers([mutation_tier()])
        .with_clock(Arc::new(clock.clone()))
        .with_shared_store(Arc::new(store.clone()))
        .build()
        .unwrap();
    let actor = ActorId::from("U1");

    store.go_down();
    assert_eq!(controller.record_violation_for(&actor, Category::StateMutation), 1);

    store.come_back();
    controller.health().reset();
    assert!(!controller.is_degraded());
    assert_eq!(controller.backoff(&actor, Category::StateMutation), 20.0);
    assert_eq!(
        controller.check(&actor, Category::StateMutation).reason,
        DenialReason::Backoff
    );
}

#[test]
fn test_waiting_out_shared_burst_denial_admits() {
    let clock = TestClock::start();
    let controller = controller(&clock, mutation_tier(), true);
    let actor = ActorId::from("U1");

    for t in [0.0, 0.5, 1.0] {
        clock.at(t);
        assert!(controller.check(&actor, Category::StateMutation).is_allowed());
    }
    clock.at(1.0);
    let denied = controller.check(&actor, Category::StateMutation);
    assert_eq!(denied.reason, DenialReason::BurstExceeded);

    clock.advance(denied.retry_after());
    let retried = controller.check(&actor, Category::StateMutation);
    assert!(retried.is_allowed(), "retry denied: {:?}", retried);
}

#[test]
fn test_workers_sharing_a_store_respect_capacity() {
    let clock = TestClock::start();
    let store = Arc::new(InMemoryWindowStore::new(Arc::new(clock.clone())));
    let workers: Vec<AdmissionController> = (0..3)
        .map(|_| {
            AdmissionController::builder()
                .with_tiers([mutation_tier()])
                .with_clock(Arc::new(clock.clone()))
                .with_shared_store(store.clone())
                .build()
                .unwrap()
        })
        .collect();
    let actor = ActorId::from("U1");

    let mut admitted = 0;
    for second in 0..60 {
        clock.at(second as f64);
        for worker in &workers {
            if worker.check(&actor, Category::StateMutation).is_allowed() {
                admitted += 1;
            }
        }
    }
    assert_eq!(admitted, 6);
}

#[test]
fn test_clock_going_backwards() {
    for shared in [true, false] {
        let clock = TestClock::start();
        let controller = controller(&clock, mutation_tier(), shared);
        let actor = ActorId::from("U1");

        clock.at(100.0);
        for _ in 0..3 {
            controller.check(&actor, Category::StateMutation);
        }
        clock.at(50.0);
        let decision = controller.check(&actor, Category::StateMutation);
        assert!(decision.retry_after_seconds >= 0.0);
        assert!(decision.retry_after_seconds.is_finite());
    }
}

#[test]
fn test_reaper_forgets_idle_actors_without_changing_decisions() {
    let clock = TestClock::start();
    let controller = controller(&clock, mutation_tier(), false);
    let reaper = controller.reaper(ReaperConfig::default()).unwrap();

    for i in 0..100 {
        controller.check(&ActorId::new(format!("actor-{}", i)), Category::StateMutation);
    }
    assert_eq!(controller.local_state().len(), 100);

    clock.advance(Duration::from_secs(3_600));
    assert_eq!(reaper.sweep(), 100);
    assert!(controller.local_state().is_empty());

    for _ in 0..3 {
        assert!(controller
            .check(&ActorId::from("actor-0"), Category::StateMutation)
            .is_allowed());
    }
}
