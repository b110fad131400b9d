//! Player health, the damage sink the controller reports penalties to.

use serde::{Deserialize, Serialize};

/// Snapshot returned after every health change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Remaining health.
    pub current: u32,
    /// Health at round start.
    pub max: u32,
}

impl HealthReport {
    /// Whether health has run out.
    #[must_use]
    pub const fn is_depleted(&self) -> bool {
        self.current == 0
    }
}

/// Receiver of damage caused by banned arrivals and wrong hits.
pub trait DamageSink {
    /// Apply `amount` damage and report the resulting health.
    fn take_damage(&mut self, amount: u32) -> HealthReport;

    /// Restore full health for a new round.
    fn reset(&mut self) -> HealthReport;

    /// Current health without changing it.
    fn report(&self) -> HealthReport;
}

/// Saturating health pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Current health points.
    pub current: u32,
    /// Maximum health points.
    pub max: u32,
}

impl Health {
    /// Create a full health pool.
    #[must_use]
    pub const fn new(max: u32) -> Self {
        Self { current: max, max }
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new(10)
    }
}

impl DamageSink for Health {
    fn take_damage(&mut self, amount: u32) -> HealthReport {
        self.current = self.current.saturating_sub(amount);
        self.report()
    }

    fn reset(&mut self) -> HealthReport {
        self.current = self.max;
        self.report()
    }

    fn report(&self) -> HealthReport {
        HealthReport {
            current: self.current,
            max: self.max,
        }
    }
}
