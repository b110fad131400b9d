//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the controller produces identical
//! results given an identical seed and delta sequence.
//!
//! # Testing Strategy
//!
//! Sources of non-determinism include:
//!
//! - **Map iteration order**: the controller keeps lanes, pools and ages in
//!   `BTreeMap`s so iteration follows identifier order.
//!
//! - **System randomness**: every draw goes through an injected
//!   [`RandomSource`](traffic_core::rng::RandomSource); tests seed it.
//!
//! - **Variable frame times**: the delta sequence is part of the input and
//!   must be replayed exactly.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: individual components (pools, ban rotation, ...)
//! 2. **Property tests**: random seeds and delta sequences still reproduce
//! 3. **Parallel tests**: running N controllers on N threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use traffic_core::config::TrafficConfig;
use traffic_core::controller::TrafficController;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic controller).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that all runs matched, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Controller is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Result of parallel controller runs.
#[derive(Debug, Clone)]
pub struct ParallelRunResult {
    /// Final state hash from each controller.
    pub hashes: Vec<u64>,
    /// Number of ticks each controller ran.
    pub ticks: u64,
    /// Number of controllers run.
    pub runs: usize,
}

impl ParallelRunResult {
    /// Check if all controllers produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all controllers matched.
    ///
    /// # Panics
    ///
    /// Panics if controllers produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel controllers diverged!\n\
                 Controllers: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.runs,
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a state machine multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `ticks` - Number of ticks per run
/// * `setup` - Function to create the initial state
/// * `step` - Function to advance the state by one tick
/// * `hash` - Function to compute the state hash
///
/// # Example
///
/// ```
/// use traffic_core::config::TrafficConfig;
/// use traffic_core::controller::TrafficController;
/// use traffic_test_utils::determinism::verify_determinism;
///
/// let result = verify_determinism(
///     3,
///     100,
///     || {
///         let mut controller = TrafficController::seeded(TrafficConfig::default(), 1).unwrap();
///         controller.start_round();
///         controller
///     },
///     |controller| {
///         controller.tick(0.1);
///     },
///     TrafficController::state_hash,
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Build a seeded controller and start its round.
///
/// # Panics
///
/// Panics if `config` fails validation.
#[must_use]
pub fn started_controller(config: TrafficConfig, seed: u64) -> TrafficController {
    let mut controller = match TrafficController::seeded(config, seed) {
        Ok(controller) => controller,
        Err(err) => panic!("fixture config rejected: {err}"),
    };
    controller.start_round();
    controller
}

/// Advance `controller` once per entry of `deltas`, simulating arrivals for
/// every car that has driven the full length of its lane.
pub fn drive(controller: &mut TrafficController, deltas: &[f32]) {
    for &dt in deltas {
        controller.tick(dt);
        deliver_arrivals(controller);
    }
}

/// Report arrival for every active car that has covered its lane length.
/// Returns how many arrivals were reported.
pub fn deliver_arrivals(controller: &mut TrafficController) -> usize {
    let arrived: Vec<_> = controller
        .active_instances()
        .filter_map(|instance| {
            let lane = instance.lane?;
            let length = controller.placement().length(lane)?;
            (instance.travelled >= length).then_some((instance.id, lane))
        })
        .collect();
    for &(instance, lane) in &arrived {
        controller.on_arrival(instance, lane);
    }
    arrived.len()
}

/// Simplified determinism verification for [`TrafficController`].
///
/// Runs the same seed and delta sequence twice and checks the final state
/// hashes match exactly.
pub fn verify_controller_determinism(config: &TrafficConfig, seed: u64, deltas: &[f32]) -> bool {
    let result = verify_determinism(
        2,
        deltas.len() as u64,
        || (started_controller(config.clone(), seed), 0usize),
        |(controller, cursor)| {
            drive(controller, &deltas[*cursor..=*cursor]);
            *cursor += 1;
        },
        |(controller, _)| controller.state_hash(),
    );
    result.is_deterministic
}

/// Run N controllers on scoped threads and collect final hashes.
///
/// Catches non-determinism that only shows up under different thread
/// scheduling or memory layout.
///
/// # Panics
///
/// Panics if a worker thread panics.
pub fn run_parallel_controllers_scoped<F>(
    setup_fn: F,
    runs: usize,
    ticks: u64,
    dt: f32,
) -> ParallelRunResult
where
    F: Fn() -> TrafficController + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..runs)
            .map(|_| {
                s.spawn(|| {
                    let mut controller = setup_fn();
                    for _ in 0..ticks {
                        controller.tick(dt);
                        deliver_arrivals(&mut controller);
                    }
                    controller.state_hash()
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    ParallelRunResult {
        hashes,
        ticks,
        runs,
    }
}

/// Compare two controller runs tick-by-tick, finding the first divergence.
///
/// # Returns
///
/// `None` if the runs are deterministic, `Some(tick)` if they diverge at
/// that tick.
pub fn find_first_divergence<F>(setup_fn: F, deltas: &[f32]) -> Option<u64>
where
    F: Fn() -> TrafficController,
{
    let mut first = setup_fn();
    let mut second = setup_fn();

    if first.state_hash() != second.state_hash() {
        return Some(0);
    }

    for (tick, &dt) in (1u64..).zip(deltas) {
        first.tick(dt);
        deliver_arrivals(&mut first);
        second.tick(dt);
        deliver_arrivals(&mut second);

        if first.state_hash() != second.state_hash() {
            tracing::warn!(tick, "Controllers diverged");
            return Some(tick);
        }
    }

    None
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for controller testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing.
pub mod strategies {
    use proptest::prelude::*;
    use traffic_core::config::{LaneGroupConfig, TrafficConfig};
    use traffic_core::entity::{LaneId, Position, Template, TemplateId};
    use traffic_core::placement::LaneConfig;

    /// Generate a frame delta between 1 ms and 0.25 s.
    pub fn arb_dt() -> impl Strategy<Value = f32> {
        (1u32..250u32).prop_map(|ms| ms as f32 / 1000.0)
    }

    /// Generate a sequence of frame deltas.
    pub fn arb_delta_sequence(max_len: usize) -> impl Strategy<Value = Vec<f32>> {
        proptest::collection::vec(arb_dt(), 1..max_len)
    }

    /// Generate a seed.
    pub fn arb_seed() -> impl Strategy<Value = u64> {
        any::<u64>()
    }

    /// Generate a manual override request `(group, template_index)`.
    /// Indices may be out of range on purpose.
    pub fn arb_override() -> impl Strategy<Value = (usize, usize)> {
        (0usize..4, 0usize..6)
    }

    /// Generate a valid configuration: 2-5 templates, 3-8 lanes, small
    /// pools and optionally one lane group per pair of lanes.
    pub fn arb_config() -> impl Strategy<Value = TrafficConfig> {
        (
            2u32..=5,
            3u32..=8,
            1usize..=4,
            0usize..=2,
            any::<bool>(),
            proptest::option::of(0u32..=5),
        )
            .prop_map(|(templates, lanes, capacity, cooldown, paired, growth)| {
                let mut config = TrafficConfig::default();
                config.templates = (0..templates)
                    .map(|id| {
                        Template::new(TemplateId(id), format!("car{id}"))
                            .with_display_asset(format!("signs/car{id}.png"))
                    })
                    .collect();
                config.lanes = (0..lanes)
                    .map(|id| {
                        let side = if id % 2 == 0 { -10.0 } else { 10.0 };
                        LaneConfig::new(LaneId(id), Position::new(side, 0.0, id as f32), 20.0)
                    })
                    .collect();
                config.lane_groups = if paired {
                    (0..lanes)
                        .step_by(2)
                        .map(|first| {
                            let members = (first..(first + 2).min(lanes)).map(LaneId).collect();
                            LaneGroupConfig::new(format!("section{}", first / 2), members)
                        })
                        .collect()
                } else {
                    Vec::new()
                };
                config.pool.capacity = capacity;
                config.pool.auto_return_time = 8.0;
                config.spawn.interval = 0.5;
                config.spawn.cooldown_count = cooldown;
                config.ban.min_time = 1.0;
                config.ban.max_time = 3.0;
                config.ban.weight_growth = growth.is_some();
                config.ban.weight_growth_per_second = growth.map_or(0.1, |rate| rate as f32 * 0.1);
                config.health.max_health = 1000;
                config
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use proptest::prelude::*;

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);

        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![100, 100, 100]);
    }

    #[test]
    fn test_default_round_is_deterministic() {
        let deltas = vec![0.05; 600];
        assert!(verify_controller_determinism(
            &TrafficConfig::default(),
            42,
            &deltas
        ));
    }

    #[test]
    fn test_road_sections_are_deterministic() {
        let deltas: Vec<f32> = (0..400).map(|i| 0.02 + (i % 7) as f32 * 0.01).collect();
        assert!(verify_controller_determinism(
            &fixtures::road_section_config(),
            7,
            &deltas
        ));
    }

    #[test]
    fn test_parallel_controllers_match() {
        let result = run_parallel_controllers_scoped(
            || started_controller(TrafficConfig::default(), 99),
            4,
            500,
            0.05,
        );
        result.assert_deterministic();
    }

    #[test]
    fn test_no_divergence() {
        let deltas = vec![0.1; 300];
        let divergence =
            find_first_divergence(|| started_controller(TrafficConfig::default(), 3), &deltas);
        assert!(divergence.is_none(), "Expected no divergence");
    }

    #[test]
    fn test_different_seeds_differ() {
        let mut a = started_controller(TrafficConfig::default(), 1);
        let mut b = started_controller(TrafficConfig::default(), 2);
        let deltas = vec![0.1; 200];
        drive(&mut a, &deltas);
        drive(&mut b, &deltas);
        assert_ne!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_compute_hash_is_stable() {
        assert_eq!(compute_hash(&(1u32, "lane")), compute_hash(&(1u32, "lane")));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_any_seed_and_deltas_reproduce(
            config in strategies::arb_config(),
            seed in strategies::arb_seed(),
            deltas in strategies::arb_delta_sequence(200),
        ) {
            prop_assert!(verify_controller_determinism(&config, seed, &deltas));
        }
    }
}
