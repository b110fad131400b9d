//! Property tests over random configurations, seeds and frame times.

use proptest::prelude::*;
use traffic_core::ban::{BanCause, BanEvent};
use traffic_core::entity::TemplateId;
use traffic_core::pool::PoolRegistry;
use traffic_core::rng::SeededRandom;
use traffic_core::spawner::choose_template;
use traffic_test_utils::determinism::{deliver_arrivals, started_controller, strategies};
use traffic_test_utils::fixtures;
use traffic_test_utils::invariants::check_invariants;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Every instance is either pooled or in exactly one lane, every tick.
    #[test]
    fn prop_instances_are_exclusive(
        config in strategies::arb_config(),
        seed in strategies::arb_seed(),
        deltas in strategies::arb_delta_sequence(300),
        overrides in proptest::collection::vec(strategies::arb_override(), 0..10),
    ) {
        let mut controller = started_controller(config, seed);
        for (tick, &dt) in deltas.iter().enumerate() {
            if let Some(&(group, index)) = overrides.get(tick % 30) {
                controller.request_ban(group, index);
            }
            controller.tick(dt);
            deliver_arrivals(&mut controller);
            if let Err(violation) = check_invariants(&controller) {
                prop_assert!(false, "tick {}: {}", tick, violation);
            }
        }
    }

    /// A ban never lands on a template that is driving in the group's lanes.
    #[test]
    fn prop_rotation_never_bans_live_template(
        config in strategies::arb_config(),
        seed in strategies::arb_seed(),
        deltas in strategies::arb_delta_sequence(300),
        overrides in proptest::collection::vec(strategies::arb_override(), 0..10),
    ) {
        let mut controller = started_controller(config, seed);
        for (tick, &dt) in deltas.iter().enumerate() {
            if let Some(&(group, index)) = overrides.get(tick % 30) {
                controller.request_ban(group, index);
            }
            let events = controller.tick(dt);
            for event in &events.ban_events {
                let BanEvent::Changed(change) = event else { continue };
                prop_assert_ne!(change.cause, BanCause::RoundStart);
                let lanes = controller.bans().groups()[change.group].lanes().to_vec();
                prop_assert!(
                    !controller.lanes().holds_template(&lanes, change.current, controller.pools()),
                    "tick {}: {:?} banned while live",
                    tick,
                    change
                );
            }
            deliver_arrivals(&mut controller);
        }
    }

    /// The ban never moves away from a template that is still driving in the
    /// group's lanes.
    #[test]
    fn prop_rotation_waits_for_outgoing_template(
        config in strategies::arb_config(),
        seed in strategies::arb_seed(),
        deltas in strategies::arb_delta_sequence(300),
        overrides in proptest::collection::vec(strategies::arb_override(), 0..10),
    ) {
        prop_assume!(config.ban.guard_outgoing);
        let mut controller = started_controller(config, seed);
        for (tick, &dt) in deltas.iter().enumerate() {
            if let Some(&(group, index)) = overrides.get(tick % 30) {
                controller.request_ban(group, index);
            }
            let live_banned: Vec<Option<TemplateId>> = controller
                .bans()
                .groups()
                .iter()
                .map(|group| {
                    group.state().template().filter(|&banned| {
                        controller
                            .lanes()
                            .holds_template(group.lanes(), banned, controller.pools())
                    })
                })
                .collect();

            let events = controller.tick(dt);
            for event in &events.ban_events {
                let BanEvent::Changed(change) = event else { continue };
                if let Some(live) = live_banned[change.group] {
                    prop_assert_ne!(
                        change.previous,
                        Some(live),
                        "tick {}: ban left {} while it was on the road",
                        tick,
                        live
                    );
                }
            }
            deliver_arrivals(&mut controller);
        }
    }

    /// A lane is not reused until `cooldown_count` other spawns happened.
    #[test]
    fn prop_cooldown_excludes_recent_lanes(
        config in strategies::arb_config(),
        seed in strategies::arb_seed(),
        deltas in strategies::arb_delta_sequence(300),
    ) {
        let cooldown = config.spawn.cooldown_count;
        let mut controller = started_controller(config, seed);
        let mut history = Vec::new();
        for &dt in &deltas {
            let events = controller.tick(dt);
            for record in &events.spawned {
                let recent = &history[history.len().saturating_sub(cooldown)..];
                prop_assert!(!recent.contains(&record.lane), "{:?} after {:?}", record.lane, recent);
                history.push(record.lane);
            }
            deliver_arrivals(&mut controller);
        }
    }

    /// Releasing twice leaves the instance in its free list exactly once.
    #[test]
    fn prop_release_is_idempotent(capacity in 1usize..8, releases in 1usize..4) {
        let config = fixtures::single_template_config(capacity, 1);
        let x = fixtures::template(0);
        let mut pools = PoolRegistry::new(&config.templates, capacity);

        let car = pools.acquire(x, 0.0).unwrap();
        let mut released = 0;
        for _ in 0..releases {
            if pools.release(car) {
                released += 1;
            }
        }
        prop_assert_eq!(released, 1);
        prop_assert_eq!(pools.free_count(x), capacity);
        prop_assert_eq!(pools.active_count(x), 0);
    }
}

/// Banned share converges to `W / (W + N - 1)`.
#[test]
fn weighted_choice_converges() {
    let eligible: Vec<_> = (0..4).map(TemplateId).collect();
    let banned = TemplateId(2);
    let mut rng = SeededRandom::new(1234);

    for weight in [1.0_f32, 2.0, 5.0] {
        let draws = 40_000;
        let hits = (0..draws)
            .filter(|_| choose_template(&eligible, Some(banned), weight, &mut rng) == Some(banned))
            .count();
        let expected = weight / (weight + 3.0);
        let observed = hits as f32 / draws as f32;
        assert!(
            (observed - expected).abs() < 0.015,
            "weight {weight}: expected {expected}, observed {observed}"
        );
    }
}
