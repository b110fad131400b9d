//! Scenario loading and configuration.
//!
//! A scenario bundles a controller configuration with the run parameters
//! the headless runner needs: seed, tick count, frame delta and how often
//! the simulated player fires.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use traffic_core::config::{LaneGroupConfig, TrafficConfig};
use traffic_core::entity::LaneId;
use traffic_core::error::TrafficError;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// The embedded controller configuration failed validation.
    #[error("Invalid scenario configuration: {0}")]
    Invalid(#[from] TrafficError),
}

/// A complete scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Controller configuration.
    #[serde(default)]
    pub config: TrafficConfig,
    /// Default seed.
    #[serde(default)]
    pub seed: u64,
    /// Default number of ticks per round.
    #[serde(default = "default_ticks")]
    pub ticks: u64,
    /// Default frame delta in seconds.
    #[serde(default = "default_dt")]
    pub dt: f32,
    /// Chance per tick that the simulated player shoots a random car.
    #[serde(default)]
    pub hit_chance: f32,
}

/// Five minutes at 60 ticks per second.
const fn default_ticks() -> u64 {
    5 * 60 * 60
}

fn default_dt() -> f32 {
    1.0 / 60.0
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: "Default Road".to_string(),
            description: "Six lanes, four car kinds, one ban sign".to_string(),
            config: TrafficConfig::default(),
            seed: 0,
            ticks: default_ticks(),
            dt: default_dt(),
            hit_chance: 0.0,
        }
    }
}

impl Scenario {
    /// Load a scenario from a RON file. Does not validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let scenario: Scenario = ron::from_str(&contents)?;
        tracing::debug!(name = %scenario.name, path = %path.display(), "Loaded scenario");
        Ok(scenario)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Startup validation: the controller configuration plus the run
    /// parameters.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.config.validate()?;
        if !(self.dt > 0.0) {
            return Err(TrafficError::InvalidConfig("dt must be positive".to_string()).into());
        }
        if !(0.0..=1.0).contains(&self.hit_chance) {
            return Err(TrafficError::InvalidConfig(
                "hit_chance must lie in [0, 1]".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Six lanes split into three signed road sections.
    #[must_use]
    pub fn road_sections() -> Self {
        let mut scenario = Self {
            name: "Road Sections".to_string(),
            description: "Three road sections, each with its own ban sign".to_string(),
            hit_chance: 0.01,
            ..Self::default()
        };
        scenario.config.lane_groups = (0u32..3)
            .map(|section| {
                LaneGroupConfig::new(
                    format!("section{section}"),
                    vec![LaneId(section * 2), LaneId(section * 2 + 1)],
                )
            })
            .collect();
        scenario
    }

    /// Look up a built-in scenario by name.
    #[must_use]
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "default" | "single_ban" => Some(Self::default()),
            "road_sections" => Some(Self::road_sections()),
            _ => None,
        }
    }
}
