//! Test fixtures and helpers.
//!
//! Pre-built configurations and a scripted random source for consistent
//! testing.

use traffic_core::config::{LaneGroupConfig, TrafficConfig};
use traffic_core::entity::{LaneId, Position, Template, TemplateId};
use traffic_core::placement::LaneConfig;
use traffic_core::rng::RandomSource;

/// Shorthand for a template identifier.
#[must_use]
pub const fn template(id: u32) -> TemplateId {
    TemplateId(id)
}

/// Shorthand for a lane identifier.
#[must_use]
pub const fn lane(id: u32) -> LaneId {
    LaneId(id)
}

/// Templates named `A`, `B`, `C`, ... with sign images.
#[must_use]
pub fn lettered_templates(count: u32) -> Vec<Template> {
    (0..count)
        .map(|id| {
            let name = char::from(b'A' + id as u8).to_string();
            Template::new(TemplateId(id), name.clone()).with_display_asset(format!("signs/{name}.png"))
        })
        .collect()
}

/// `count` lanes alternating sides, 20 units long.
#[must_use]
pub fn alternating_lanes(count: u32) -> Vec<LaneConfig> {
    (0..count)
        .map(|id| {
            let side = if id % 2 == 0 { -10.0 } else { 10.0 };
            LaneConfig::new(LaneId(id), Position::new(side, 0.0, id as f32 * 3.0), 20.0)
        })
        .collect()
}

/// Three templates `A`, `B`, `C` on three lanes with a single ban group.
#[must_use]
pub fn three_lane_config() -> TrafficConfig {
    TrafficConfig {
        templates: lettered_templates(3),
        lanes: alternating_lanes(3),
        ..TrafficConfig::default()
    }
}

/// One template with `capacity` instances on `lanes` lanes.
#[must_use]
pub fn single_template_config(capacity: usize, lanes: u32) -> TrafficConfig {
    let mut config = TrafficConfig {
        templates: lettered_templates(1),
        lanes: alternating_lanes(lanes),
        ..TrafficConfig::default()
    };
    config.pool.capacity = capacity;
    config.spawn.cooldown_count = 0;
    config
}

/// The default six-lane road split into three signed road sections:
/// lanes 0-1, 2-3 and 4-5.
#[must_use]
pub fn road_section_config() -> TrafficConfig {
    TrafficConfig {
        lane_groups: (0u32..3)
            .map(|section| {
                LaneGroupConfig::new(
                    format!("section{section}"),
                    vec![LaneId(section * 2), LaneId(section * 2 + 1)],
                )
            })
            .collect(),
        ..TrafficConfig::default()
    }
}

/// Random source replaying a fixed list of unit values, cycling when
/// exhausted.
///
/// Useful to force specific lane, template or interval choices.
#[derive(Debug, Clone)]
pub struct ScriptedRandom {
    values: Vec<f32>,
    cursor: usize,
}

impl ScriptedRandom {
    /// Replay `values`; each must lie in `[0, 1)`.
    ///
    /// # Panics
    ///
    /// Panics if `values` is empty.
    #[must_use]
    pub fn new(values: Vec<f32>) -> Self {
        assert!(!values.is_empty(), "ScriptedRandom needs at least one value");
        Self { values, cursor: 0 }
    }

    /// Always return `value`.
    #[must_use]
    pub fn constant(value: f32) -> Self {
        Self::new(vec![value])
    }

    /// Number of values drawn so far.
    #[must_use]
    pub const fn draws(&self) -> usize {
        self.cursor
    }
}

impl RandomSource for ScriptedRandom {
    fn next_unit(&mut self) -> f32 {
        let value = self.values[self.cursor % self.values.len()];
        self.cursor += 1;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_validate() {
        assert!(three_lane_config().validate().is_ok());
        assert!(single_template_config(2, 4).validate().is_ok());
        assert!(road_section_config().validate().is_ok());
        assert_eq!(road_section_config().resolved_groups().len(), 3);
    }

    #[test]
    fn test_scripted_random_cycles() {
        let mut rng = ScriptedRandom::new(vec![0.0, 0.5]);
        assert_eq!(rng.index(4), 0);
        assert_eq!(rng.index(4), 2);
        assert_eq!(rng.index(4), 0);
        assert_eq!(rng.draws(), 3);
    }
}
