//! Headless lane-traffic runner.
//!
//! # Usage
//!
//! ```bash
//! # Run a single round and print its metrics
//! cargo run -p traffic_headless -- run --scenario scenarios/single_ban.ron --seed 7
//!
//! # Run a batch of seeds in parallel
//! cargo run -p traffic_headless -- batch --builtin road_sections --seeds 1000 --output results/batch.json
//!
//! # Validate a scenario file
//! cargo run -p traffic_headless -- validate scenarios/road_sections.ron
//! ```
//!
//! Output (stdout): JSON
//! Logs (stderr): `RUST_LOG` filter, `--verbose` for debug

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use traffic_headless::{
    batch::{run_batch, BatchConfig},
    runner::run_scenario,
    scenario::{Scenario, ScenarioError},
};

#[derive(Parser)]
#[command(name = "traffic_headless")]
#[command(about = "Headless lane-traffic runner for balance sweeps and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where to take the scenario from.
#[derive(Args)]
struct ScenarioSource {
    /// Scenario RON file
    #[arg(short, long, conflicts_with = "builtin")]
    scenario: Option<PathBuf>,

    /// Built-in scenario name (default, road_sections)
    #[arg(short, long)]
    builtin: Option<String>,
}

impl ScenarioSource {
    fn load(&self) -> Result<Scenario, ScenarioError> {
        if let Some(path) = &self.scenario {
            return Scenario::load(path);
        }
        let name = self.builtin.as_deref().unwrap_or("default");
        Scenario::builtin(name).ok_or_else(|| ScenarioError::FileNotFound(name.to_string()))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single round
    Run {
        #[command(flatten)]
        source: ScenarioSource,

        /// Seed (defaults to the scenario's)
        #[arg(long)]
        seed: Option<u64>,

        /// Maximum ticks (defaults to the scenario's)
        #[arg(long)]
        ticks: Option<u64>,

        /// Frame delta in seconds (defaults to the scenario's)
        #[arg(long)]
        dt: Option<f32>,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Run one round per seed in parallel
    Batch {
        #[command(flatten)]
        source: ScenarioSource,

        /// Number of seeds
        #[arg(long, default_value = "100")]
        seeds: u32,

        /// First seed (defaults to the scenario's)
        #[arg(long)]
        start_seed: Option<u64>,

        /// Maximum ticks per round (defaults to the scenario's)
        #[arg(long)]
        ticks: Option<u64>,

        /// Maximum parallel rounds (0 = rayon default)
        #[arg(short, long, default_value = "0")]
        parallel: usize,

        /// Write full results to this JSON file instead of printing the summary
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a scenario file and exit
    Validate {
        /// Scenario RON file
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs to stderr; stdout carries JSON
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    let result = match cli.command {
        Commands::Run {
            source,
            seed,
            ticks,
            dt,
            pretty,
        } => cmd_run(&source, seed, ticks, dt, pretty),
        Commands::Batch {
            source,
            seeds,
            start_seed,
            ticks,
            parallel,
            output,
        } => cmd_batch(&source, seeds, start_seed, ticks, parallel, output),
        Commands::Validate { file } => cmd_validate(file),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String, Box<dyn std::error::Error>> {
    Ok(if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}

/// Run a single round
fn cmd_run(
    source: &ScenarioSource,
    seed: Option<u64>,
    ticks: Option<u64>,
    dt: Option<f32>,
    pretty: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = source.load()?;
    let seed = seed.unwrap_or(scenario.seed);
    let ticks = ticks.unwrap_or(scenario.ticks);
    let dt = dt.unwrap_or(scenario.dt);
    tracing::info!(scenario = %scenario.name, seed, ticks, dt, "Running round");

    let metrics = run_scenario(&scenario, seed, ticks, dt)?;
    println!("{}", to_json(&metrics, pretty)?);
    Ok(())
}

/// Run a batch of rounds
fn cmd_batch(
    source: &ScenarioSource,
    seeds: u32,
    start_seed: Option<u64>,
    ticks: Option<u64>,
    parallel: usize,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = source.load()?;
    scenario.validate()?;

    let mut config = BatchConfig::for_scenario(&scenario, seeds);
    if let Some(seed) = start_seed {
        config = config.with_start_seed(seed);
    }
    if let Some(ticks) = ticks {
        config.ticks = ticks;
    }

    if parallel > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(parallel)
            .build_global()
            .ok(); // Ignore if already set
    }

    let results = run_batch(&scenario, config);
    match output {
        Some(path) => {
            results.save(&path)?;
            tracing::info!(path = %path.display(), "Batch results written");
        }
        None => println!("{}", to_json(&results.summary, true)?),
    }
    if !results.errors.is_empty() {
        return Err(format!("{} rounds failed", results.errors.len()).into());
    }
    Ok(())
}

/// Validate a scenario file
fn cmd_validate(file: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = Scenario::load(&file)?;
    scenario.validate()?;
    println!(
        "{}",
        serde_json::json!({
            "valid": true,
            "name": scenario.name,
            "templates": scenario.config.templates.len(),
            "lanes": scenario.config.lanes.len(),
            "lane_groups": scenario.config.resolved_groups().len(),
        })
    );
    Ok(())
}
