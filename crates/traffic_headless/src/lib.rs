//! Headless round runner for balance sweeps and CI verification.
//!
//! Plays the parts of the game the controller does not own: it reports
//! arrivals for cars that reached the end of their lane and, optionally,
//! shoots random cars. Results are collected as [`RunMetrics`] and printed
//! as JSON on stdout; logs go to stderr.
//!
//! # Example
//!
//! ```bash
//! # Run one round of a scenario file
//! cargo run -p traffic_headless -- run --scenario crates/traffic_headless/scenarios/road_sections.ron
//!
//! # Sweep 500 seeds in parallel
//! cargo run -p traffic_headless -- batch --builtin road_sections --seeds 500
//!
//! # Startup validation only
//! cargo run -p traffic_headless -- validate crates/traffic_headless/scenarios/single_ban.ron
//! ```

pub mod batch;
pub mod metrics;
pub mod runner;
pub mod scenario;

pub use batch::{run_batch, BatchConfig, BatchResults};
pub use metrics::{BatchSummary, RunMetrics};
pub use runner::{run_scenario, HeadlessRunner};
pub use scenario::{Scenario, ScenarioError};
