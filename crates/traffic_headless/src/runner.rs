//! Headless round runner.
//!
//! Stands in for the game's collision and projectile collaborators: cars
//! that have driven the full length of their lane are reported as arrived,
//! and with probability `hit_chance` per tick a random car is shot.

use traffic_core::controller::{RoundState, TrafficController};
use traffic_core::rng::{RandomSource, SeededRandom};

use crate::metrics::RunMetrics;
use crate::scenario::{Scenario, ScenarioError};

/// Offset separating the player's random stream from the controller's.
const PLAYER_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

/// Drives one controller through one round.
#[derive(Debug)]
pub struct HeadlessRunner {
    controller: TrafficController,
    player: SeededRandom,
    hit_chance: f32,
    metrics: RunMetrics,
}

impl HeadlessRunner {
    /// Validate `scenario` and start a round with `seed`.
    pub fn new(scenario: &Scenario, seed: u64) -> Result<Self, ScenarioError> {
        scenario.validate()?;
        let mut controller = TrafficController::seeded(scenario.config.clone(), seed)?;
        controller.start_round();
        Ok(Self {
            controller,
            player: SeededRandom::new(seed ^ PLAYER_SEED_SALT),
            hit_chance: scenario.hit_chance,
            metrics: RunMetrics::new(&scenario.name, seed),
        })
    }

    /// Advance one tick, then deliver arrivals and maybe fire a shot.
    ///
    /// Returns `false` once the round is over.
    pub fn step(&mut self, dt: f32) -> bool {
        let events = self.controller.tick(dt);
        self.metrics.record_tick(&events);
        self.deliver_arrivals();
        self.maybe_shoot();
        self.metrics.ticks_run += 1;
        self.metrics.duration_seconds += dt;

        if self.controller.state() == RoundState::Over {
            self.metrics.lost_at_tick.get_or_insert(self.controller.tick_count());
            return false;
        }
        true
    }

    fn deliver_arrivals(&mut self) {
        let arrived: Vec<_> = self
            .controller
            .active_instances()
            .filter_map(|instance| {
                let lane = instance.lane?;
                let length = self.controller.placement().length(lane)?;
                (instance.travelled >= length).then_some((instance.id, lane))
            })
            .collect();
        for (instance, lane) in arrived {
            let outcome = self.controller.on_arrival(instance, lane);
            self.metrics.record_arrival(&outcome);
        }
    }

    fn maybe_shoot(&mut self) {
        if self.hit_chance <= 0.0 || self.player.next_unit() >= self.hit_chance {
            return;
        }
        let targets: Vec<_> = self.controller.active_instances().map(|i| i.id).collect();
        if targets.is_empty() {
            return;
        }
        let target = targets[self.player.index(targets.len())];
        let outcome = self.controller.on_hit(target);
        self.metrics.record_hit(&outcome);
    }

    /// Run up to `ticks` ticks of `dt` seconds, stopping early if the round
    /// is lost, and return the collected metrics.
    pub fn run(mut self, ticks: u64, dt: f32) -> RunMetrics {
        for _ in 0..ticks {
            if !self.step(dt) {
                break;
            }
        }
        self.finish()
    }

    /// Stamp final state onto the metrics.
    pub fn finish(mut self) -> RunMetrics {
        self.metrics.score = self.controller.score();
        self.metrics.final_health = self.controller.health().current;
        self.metrics.final_state_hash = self.controller.state_hash();
        tracing::info!(
            scenario = %self.metrics.scenario,
            seed = self.metrics.seed,
            ticks = self.metrics.ticks_run,
            spawns = self.metrics.spawns,
            score = self.metrics.score,
            health = self.metrics.final_health,
            state_hash = self.metrics.final_state_hash,
            "Round finished"
        );
        self.metrics
    }

    /// The controller being driven.
    #[must_use]
    pub fn controller(&self) -> &TrafficController {
        &self.controller
    }

    /// Metrics collected so far.
    #[must_use]
    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }
}

/// Run one round of `scenario`.
pub fn run_scenario(
    scenario: &Scenario,
    seed: u64,
    ticks: u64,
    dt: f32,
) -> Result<RunMetrics, ScenarioError> {
    Ok(HeadlessRunner::new(scenario, seed)?.run(ticks, dt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_spawns_and_delivers() {
        let scenario = Scenario::default();
        let metrics = run_scenario(&scenario, 1, 60 * 30, 1.0 / 60.0).unwrap();
        assert!(metrics.spawns >= 10);
        assert!(metrics.arrivals > 0);
        assert_eq!(metrics.ticks_run, metrics.lost_at_tick.unwrap_or(60 * 30));
    }

    #[test]
    fn test_same_seed_same_metrics() {
        let scenario = Scenario::road_sections();
        let a = run_scenario(&scenario, 9, 2000, 0.02).unwrap();
        let b = run_scenario(&scenario, 9, 2000, 0.02).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hits_are_recorded() {
        let mut scenario = Scenario {
            hit_chance: 0.5,
            ..Scenario::default()
        };
        scenario.config.health.max_health = 10_000;
        let metrics = run_scenario(&scenario, 3, 3000, 0.05).unwrap();
        assert!(metrics.hits_scored + metrics.hits_penalized > 0);
        assert_eq!(metrics.score, metrics.hits_scored);
    }

    #[test]
    fn test_invalid_scenario_rejected() {
        let mut scenario = Scenario::default();
        scenario.config.templates.clear();
        assert!(matches!(
            HeadlessRunner::new(&scenario, 0),
            Err(ScenarioError::Invalid(_))
        ));
    }
}
