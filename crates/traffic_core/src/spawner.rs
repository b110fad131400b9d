//! Spawn timing, lane choice and weighted template choice.
//!
//! The scheduler only decides *when* a spawn is due; the selection functions
//! decide *where* and *what*. The controller strings them together with the
//! pools and the lane tracker.

use serde::{Deserialize, Serialize};

use crate::config::SpawnSettings;
use crate::cooldown::CooldownQueue;
use crate::entity::{Heading, InstanceId, LaneId, Position, TemplateId};
use crate::rng::RandomSource;

/// Accumulator deciding when the next spawn is due.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnScheduler {
    interval: f32,
    timer: f32,
    first_spawn_immediate: bool,
}

impl SpawnScheduler {
    /// Create a scheduler; call [`Self::reset`] before the first round.
    #[must_use]
    pub fn new(settings: &SpawnSettings) -> Self {
        Self {
            interval: settings.interval,
            timer: 0.0,
            first_spawn_immediate: settings.first_spawn_immediate,
        }
    }

    /// Restart the timer for a new round.
    pub fn reset(&mut self) {
        self.timer = if self.first_spawn_immediate {
            self.interval
        } else {
            0.0
        };
    }

    /// Zero the timer without priming it.
    pub fn clear(&mut self) {
        self.timer = 0.0;
    }

    /// Accumulate `dt` seconds.
    pub fn advance(&mut self, dt: f32) {
        self.timer += dt;
    }

    /// Whether a spawn should be attempted this tick.
    #[must_use]
    pub fn is_due(&self) -> bool {
        self.timer >= self.interval
    }

    /// Restart the interval after a successful spawn. Skipped spawns leave
    /// the timer alone so they are retried on the next tick.
    pub fn mark_spawned(&mut self) {
        self.timer = 0.0;
    }

    /// Seconds accumulated since the last spawn.
    #[must_use]
    pub const fn timer(&self) -> f32 {
        self.timer
    }

    /// Configured interval.
    #[must_use]
    pub const fn interval(&self) -> f32 {
        self.interval
    }
}

/// A successful spawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnRecord {
    /// Spawned instance.
    pub instance: InstanceId,
    /// Its template.
    pub template: TemplateId,
    /// Lane it was placed in.
    pub lane: LaneId,
    /// Spawn anchor.
    pub position: Position,
    /// Travel direction.
    pub heading: Heading,
    /// Whether the template was banned in that lane at spawn time.
    pub banned: bool,
}

/// Pick a lane uniformly among those not cooling down.
///
/// Returns `None` when every lane is on cooldown; there is no fallback.
pub fn choose_lane(
    lanes: impl IntoIterator<Item = LaneId>,
    cooldown: &CooldownQueue,
    rng: &mut impl RandomSource,
) -> Option<LaneId> {
    let eligible = cooldown.eligible(lanes);
    if eligible.is_empty() {
        return None;
    }
    Some(eligible[rng.index(eligible.len())])
}

/// Weighted template choice.
///
/// The banned template weighs `banned_weight`, every other eligible template
/// weighs 1. When the banned template is not eligible (or nothing is banned)
/// all eligible templates are equally likely.
pub fn choose_template(
    eligible: &[TemplateId],
    banned: Option<TemplateId>,
    banned_weight: f32,
    rng: &mut impl RandomSource,
) -> Option<TemplateId> {
    if eligible.is_empty() {
        return None;
    }
    let Some(banned) = banned.filter(|banned| eligible.contains(banned)) else {
        return Some(eligible[rng.index(eligible.len())]);
    };

    let others: Vec<_> = eligible
        .iter()
        .copied()
        .filter(|&template| template != banned)
        .collect();
    let total = others.len() as f32 + banned_weight;
    let roll = rng.range_f32(0.0, total);
    if roll < banned_weight || others.is_empty() {
        return Some(banned);
    }
    Some(others[rng.index(others.len())])
}
