//! Structural invariant checks for a running controller.
//!
//! Call [`check_invariants`] after every tick in property tests; it walks
//! the pools, the lane tracker and the cooldown queue and reports the first
//! inconsistency it finds.

use std::collections::BTreeSet;

use traffic_core::controller::TrafficController;
use traffic_core::health::DamageSink;
use traffic_core::rng::RandomSource;

/// Verify pool exclusivity, lane agreement and cooldown bounds.
///
/// # Errors
///
/// A description of the first violated invariant.
pub fn check_invariants<R: RandomSource, D: DamageSink>(
    controller: &TrafficController<R, D>,
) -> Result<(), String> {
    let pools = controller.pools();

    for (template, pool) in pools.pools() {
        if pool.free_count() + pool.active_count() != pool.capacity() {
            return Err(format!(
                "{template}: free {} + active {} != capacity {}",
                pool.free_count(),
                pool.active_count(),
                pool.capacity()
            ));
        }
    }

    for instance in pools.instances() {
        let Some(pool) = pools.pool(instance.template) else {
            return Err(format!("{} has no pool", instance.id));
        };
        if pool.is_free(instance.id) == pool.is_active(instance.id) {
            return Err(format!(
                "{} free={} active={}",
                instance.id,
                pool.is_free(instance.id),
                pool.is_active(instance.id)
            ));
        }
        if instance.active != pool.is_active(instance.id) {
            return Err(format!("{} active flag disagrees with its pool", instance.id));
        }
    }

    let mut seen = BTreeSet::new();
    for (lane, id) in controller.lanes().instances() {
        if !seen.insert(id) {
            return Err(format!("{id} tracked in more than one lane slot"));
        }
        let Some(instance) = pools.get(id) else {
            return Err(format!("{lane} tracks unknown {id}"));
        };
        if !instance.active {
            return Err(format!("{lane} tracks pooled {id}"));
        }
        if instance.lane != Some(lane) {
            return Err(format!("{id} is in {lane} but records {:?}", instance.lane));
        }
    }
    if seen.len() != pools.total_active() {
        return Err(format!(
            "{} instances in lanes but {} active",
            seen.len(),
            pools.total_active()
        ));
    }

    let cooldown = controller.cooldown();
    if cooldown.len() > cooldown.capacity() {
        return Err(format!(
            "cooldown holds {} lanes, capacity {}",
            cooldown.len(),
            cooldown.capacity()
        ));
    }

    Ok(())
}

/// Panic with a descriptive message if any invariant is violated.
///
/// # Panics
///
/// Panics on the first violated invariant.
pub fn assert_invariants<R: RandomSource, D: DamageSink>(controller: &TrafficController<R, D>) {
    if let Err(violation) = check_invariants(controller) {
        panic!(
            "Invariant violated at tick {}: {violation}",
            controller.tick_count()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::determinism::{deliver_arrivals, started_controller};
    use crate::fixtures;

    #[test]
    fn test_fresh_controller_is_consistent() {
        let controller = started_controller(fixtures::three_lane_config(), 0);
        assert_invariants(&controller);
    }

    #[test]
    fn test_long_round_stays_consistent() {
        let mut controller = started_controller(fixtures::road_section_config(), 5);
        for _ in 0..2000 {
            controller.tick(0.05);
            deliver_arrivals(&mut controller);
            assert_invariants(&controller);
        }
    }
}
