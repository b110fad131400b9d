//! Lane geometry: where each lane spawns its cars and how long it is.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::{LaneId, Position};

/// Spatial placement service mapping lanes to spawn anchors.
pub trait LanePlacement: fmt::Debug + Send {
    /// World anchor at which cars in `lane` appear.
    fn anchor(&self, lane: LaneId) -> Option<Position>;

    /// Distance from the anchor to the arrival boundary.
    fn length(&self, lane: LaneId) -> Option<f32>;
}

/// One lane of the layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneConfig {
    /// Lane identifier.
    pub id: LaneId,
    /// Spawn anchor.
    pub anchor: Position,
    /// Distance to the arrival boundary.
    #[serde(default = "default_lane_length")]
    pub length: f32,
}

impl LaneConfig {
    /// Create a lane.
    #[must_use]
    pub const fn new(id: LaneId, anchor: Position, length: f32) -> Self {
        Self { id, anchor, length }
    }
}

const fn default_lane_length() -> f32 {
    30.0
}

/// Static lane table built from configuration.
#[derive(Debug, Clone, Default)]
pub struct LaneLayout {
    lanes: BTreeMap<LaneId, LaneConfig>,
}

impl LaneLayout {
    /// Build the layout from lane definitions.
    #[must_use]
    pub fn new(lanes: &[LaneConfig]) -> Self {
        Self {
            lanes: lanes.iter().map(|lane| (lane.id, lane.clone())).collect(),
        }
    }
}

impl LanePlacement for LaneLayout {
    fn anchor(&self, lane: LaneId) -> Option<Position> {
        self.lanes.get(&lane).map(|config| config.anchor)
    }

    fn length(&self, lane: LaneId) -> Option<f32> {
        self.lanes.get(&lane).map(|config| config.length)
    }
}
