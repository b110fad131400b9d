//! Data-driven controller configuration.
//!
//! Loaded from RON at startup and validated once by
//! [`TrafficConfig::validate`]; the controller never re-checks it at runtime.
//!
//! # Example RON
//!
//! ```ron
//! TrafficConfig(
//!     templates: [
//!         (id: 0, name: "sedan", display_asset: Some("signs/sedan.png")),
//!         (id: 1, name: "truck", display_asset: Some("signs/truck.png")),
//!     ],
//!     lanes: [
//!         (id: 0, anchor: (x: -15.0, y: 0.0, z: 0.0), length: 30.0),
//!         (id: 1, anchor: (x: 15.0, y: 0.0, z: 2.5), length: 30.0),
//!     ],
//!     spawn: (interval: 2.0, cooldown_count: 1),
//!     ban: (min_time: 5.0, max_time: 10.0, spawn_weight: 2.0),
//! )
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::entity::{LaneId, Position, Template, TemplateId};
use crate::error::{Result, TrafficError};
use crate::placement::LaneConfig;

/// How the ban sign presents the banned template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BanDisplay {
    /// A copy of the car model sits on the sign. Needs no extra asset.
    #[default]
    Model,
    /// A 2D image is shown. Needs a display asset per template.
    Image,
}

/// Spawn timing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnSettings {
    /// Seconds between spawns.
    pub interval: f32,
    /// How many recent lanes are blocked for new spawns.
    pub cooldown_count: usize,
    /// Prime the spawn timer at round start so the first car appears on the
    /// first tick.
    pub first_spawn_immediate: bool,
}

impl Default for SpawnSettings {
    fn default() -> Self {
        Self {
            interval: 2.0,
            cooldown_count: 2,
            first_spawn_immediate: true,
        }
    }
}

/// Ban rotation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BanSettings {
    /// Lower bound (inclusive) of the rotation interval in seconds.
    pub min_time: f32,
    /// Upper bound (exclusive) of the rotation interval in seconds.
    pub max_time: f32,
    /// Baseline spawn weight of the banned template. Other templates weigh 1.
    pub spawn_weight: f32,
    /// Let the banned weight grow while the ban stands.
    pub weight_growth: bool,
    /// Growth of the banned weight per second when `weight_growth` is set.
    pub weight_growth_per_second: f32,
    /// Keep the ban in place while the currently banned template is still on
    /// the road. Disabling it only relaxes the outgoing check; a template
    /// with live instances never becomes banned.
    pub guard_outgoing: bool,
    /// Sign presentation mode.
    pub display: BanDisplay,
    /// Treat missing display assets as a fatal validation error.
    pub strict_metadata: bool,
}

impl Default for BanSettings {
    fn default() -> Self {
        Self {
            min_time: 5.0,
            max_time: 10.0,
            spawn_weight: 2.0,
            weight_growth: false,
            weight_growth_per_second: 0.1,
            guard_outgoing: true,
            display: BanDisplay::Model,
            strict_metadata: true,
        }
    }
}

/// Instance pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Instances allocated per template.
    pub capacity: usize,
    /// Seconds after which an instance that never arrived is reclaimed.
    pub auto_return_time: f32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            capacity: 5,
            auto_return_time: 10.0,
        }
    }
}

/// Health and scoring consequences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Health at round start.
    pub max_health: u32,
    /// Damage when a banned car reaches the end of its lane.
    pub damage_per_banned_arrival: u32,
    /// Damage when a projectile hits a car that is not banned.
    pub damage_per_wrong_hit: u32,
    /// Score for hitting a banned car.
    pub score_per_banned_hit: u32,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            max_health: 10,
            damage_per_banned_arrival: 1,
            damage_per_wrong_hit: 1,
            score_per_banned_hit: 1,
        }
    }
}

/// Lanes sharing one ban sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneGroupConfig {
    /// Group name, used in logs.
    pub name: String,
    /// Lanes covered by this group.
    pub lanes: Vec<LaneId>,
}

impl LaneGroupConfig {
    /// Create a lane group.
    #[must_use]
    pub fn new(name: impl Into<String>, lanes: Vec<LaneId>) -> Self {
        Self {
            name: name.into(),
            lanes,
        }
    }
}

/// Complete controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficConfig {
    /// Spawnable car kinds.
    pub templates: Vec<Template>,
    /// Lane layout.
    pub lanes: Vec<LaneConfig>,
    /// Ban groups. Empty means one group covering every lane.
    #[serde(default)]
    pub lane_groups: Vec<LaneGroupConfig>,
    /// Spawn timing.
    #[serde(default)]
    pub spawn: SpawnSettings,
    /// Ban rotation.
    #[serde(default)]
    pub ban: BanSettings,
    /// Instance pools.
    #[serde(default)]
    pub pool: PoolSettings,
    /// Health and scoring.
    #[serde(default)]
    pub health: HealthSettings,
    /// Forward speed of every car in units per second.
    #[serde(default = "default_movement_speed")]
    pub movement_speed: f32,
}

const fn default_movement_speed() -> f32 {
    6.0
}

impl Default for TrafficConfig {
    /// Four car kinds on a six-lane road with a single ban sign.
    fn default() -> Self {
        let templates = ["sedan", "taxi", "truck", "bus"]
            .iter()
            .zip(0u32..)
            .map(|(name, id)| {
                Template::new(TemplateId(id), *name).with_display_asset(format!("signs/{name}.png"))
            })
            .collect();

        let lanes = (0u32..6)
            .map(|id| {
                let side = if id % 2 == 0 { -15.0 } else { 15.0 };
                LaneConfig::new(
                    LaneId(id),
                    Position::new(side, 0.0, id as f32 * 2.5),
                    30.0,
                )
            })
            .collect();

        Self {
            templates,
            lanes,
            lane_groups: Vec::new(),
            spawn: SpawnSettings::default(),
            ban: BanSettings::default(),
            pool: PoolSettings::default(),
            health: HealthSettings::default(),
            movement_speed: default_movement_speed(),
        }
    }
}

impl TrafficConfig {
    /// Parse a configuration from a RON string. Does not validate.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        ron::from_str(ron).map_err(|e| TrafficError::InvalidConfig(e.to_string()))
    }

    /// Serialize to pretty RON.
    pub fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| TrafficError::InvalidConfig(e.to_string()))
    }

    /// Ban groups with the single-group default filled in.
    #[must_use]
    pub fn resolved_groups(&self) -> Vec<LaneGroupConfig> {
        if self.lane_groups.is_empty() {
            vec![LaneGroupConfig::new(
                "all",
                self.lanes.iter().map(|lane| lane.id).collect(),
            )]
        } else {
            self.lane_groups.clone()
        }
    }

    /// Whether `template` can be shown on the ban sign.
    #[must_use]
    pub fn has_ban_metadata(&self, template: &Template) -> bool {
        match self.ban.display {
            BanDisplay::Model => true,
            BanDisplay::Image => template.display_asset.is_some(),
        }
    }

    /// Templates that could be banned but cannot be shown on the ban sign.
    /// Protected templates are never banned and need no sign asset.
    #[must_use]
    pub fn missing_metadata(&self) -> Vec<&Template> {
        self.templates
            .iter()
            .filter(|template| !template.protected && !self.has_ban_metadata(template))
            .collect()
    }

    /// Startup validation pass.
    ///
    /// # Errors
    ///
    /// [`TrafficError::InvalidConfig`] for structural problems, and
    /// [`TrafficError::MissingTemplateMetadata`] for the first template that
    /// lacks a display asset when `ban.strict_metadata` is set.
    pub fn validate(&self) -> Result<()> {
        if self.templates.is_empty() {
            return Err(invalid("at least one template is required"));
        }
        let mut template_ids = BTreeSet::new();
        for template in &self.templates {
            if !template_ids.insert(template.id) {
                return Err(invalid(format!("duplicate template id {}", template.id)));
            }
        }

        if self.lanes.is_empty() {
            return Err(invalid("at least one lane is required"));
        }
        let mut lane_ids = BTreeSet::new();
        for lane in &self.lanes {
            if !lane_ids.insert(lane.id) {
                return Err(invalid(format!("duplicate lane id {}", lane.id)));
            }
            if !(lane.length > 0.0) {
                return Err(invalid(format!("{} must have a positive length", lane.id)));
            }
        }

        let mut grouped = BTreeSet::new();
        for group in &self.lane_groups {
            if group.lanes.is_empty() {
                return Err(invalid(format!("lane group '{}' has no lanes", group.name)));
            }
            for lane in &group.lanes {
                if !lane_ids.contains(lane) {
                    return Err(invalid(format!(
                        "lane group '{}' references unknown {lane}",
                        group.name
                    )));
                }
                if !grouped.insert(*lane) {
                    return Err(invalid(format!("{lane} belongs to more than one group")));
                }
            }
        }
        if !self.lane_groups.is_empty() && grouped.len() != lane_ids.len() {
            return Err(invalid("every lane must belong to a lane group"));
        }

        if !(self.spawn.interval > 0.0) {
            return Err(invalid("spawn interval must be positive"));
        }
        if !(self.ban.min_time >= 0.0) || self.ban.max_time < self.ban.min_time {
            return Err(invalid("ban time range must satisfy 0 <= min_time <= max_time"));
        }
        if !(self.ban.spawn_weight > 0.0) {
            return Err(invalid("banned spawn weight must be positive"));
        }
        if !(self.ban.weight_growth_per_second >= 0.0) {
            return Err(invalid("weight growth must not be negative"));
        }
        if self.pool.capacity == 0 {
            return Err(invalid("pool capacity must be at least 1"));
        }
        if !(self.pool.auto_return_time > 0.0) {
            return Err(invalid("auto return time must be positive"));
        }
        if !(self.movement_speed >= 0.0) {
            return Err(invalid("movement speed must not be negative"));
        }
        if self.health.max_health == 0 {
            return Err(invalid("max health must be at least 1"));
        }

        if self.ban.strict_metadata {
            if let Some(template) = self.missing_metadata().first() {
                return Err(TrafficError::MissingTemplateMetadata {
                    id: template.id,
                    name: template.name.clone(),
                });
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> TrafficError {
    TrafficError::InvalidConfig(message.into())
}
