//! Batch round runner for balance sweeps.
//!
//! Runs one round per seed in parallel using rayon. Each worker owns its
//! own controller; nothing is shared between rounds.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::metrics::{BatchSummary, RunMetrics};
use crate::runner::run_scenario;
use crate::scenario::Scenario;

/// Configuration for a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Number of rounds (one per seed).
    pub seeds: u32,
    /// First seed; round `i` uses `start_seed + i`.
    pub start_seed: u64,
    /// Maximum ticks per round.
    pub ticks: u64,
    /// Frame delta in seconds.
    pub dt: f32,
}

impl BatchConfig {
    /// Batch over `seeds` rounds using the scenario's tick count and delta.
    #[must_use]
    pub fn for_scenario(scenario: &Scenario, seeds: u32) -> Self {
        Self {
            seeds,
            start_seed: scenario.seed,
            ticks: scenario.ticks,
            dt: scenario.dt,
        }
    }

    /// Set the first seed.
    #[must_use]
    pub fn with_start_seed(mut self, seed: u64) -> Self {
        self.start_seed = seed;
        self
    }
}

/// Error during a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchError {
    /// Seed used.
    pub seed: u64,
    /// Error message.
    pub message: String,
}

/// Results from a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used.
    pub config: BatchConfig,
    /// Per-round metrics in seed order.
    pub runs: Vec<RunMetrics>,
    /// Aggregate summary.
    pub summary: BatchSummary,
    /// Rounds that could not be run.
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

/// Run a batch of rounds.
pub fn run_batch(scenario: &Scenario, config: BatchConfig) -> BatchResults {
    info!(
        scenario = %scenario.name,
        seeds = config.seeds,
        start_seed = config.start_seed,
        "Starting batch run"
    );

    let results: Vec<Result<RunMetrics, BatchError>> = (0..config.seeds)
        .into_par_iter()
        .map(|i| {
            let seed = config.start_seed.wrapping_add(u64::from(i));
            run_scenario(scenario, seed, config.ticks, config.dt).map_err(|err| {
                warn!(seed, error = %err, "Round failed");
                BatchError {
                    seed,
                    message: err.to_string(),
                }
            })
        })
        .collect();

    let (runs, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    let runs: Vec<RunMetrics> = runs.into_iter().filter_map(Result::ok).collect();
    let errors: Vec<BatchError> = errors.into_iter().filter_map(Result::err).collect();

    let summary = BatchSummary::from_runs(&runs);
    info!(
        runs = summary.total_runs,
        lost = summary.rounds_lost,
        banned_share = summary.mean_banned_share,
        "Batch complete"
    );

    BatchResults {
        config,
        runs,
        summary,
        errors,
    }
}
