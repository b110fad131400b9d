//! Round metrics collection for balance analysis.

use serde::{Deserialize, Serialize};
use traffic_core::ban::{BanCause, BanEvent};
use traffic_core::controller::{ArrivalOutcome, HitOutcome, TickEvents};
use traffic_core::error::TrafficError;

/// Everything measured during one round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Scenario name.
    pub scenario: String,
    /// Random seed used.
    pub seed: u64,
    /// Ticks actually simulated.
    pub ticks_run: u64,
    /// Simulated seconds.
    pub duration_seconds: f32,

    // === Spawning ===
    /// Cars spawned.
    pub spawns: u32,
    /// Cars spawned while their template was banned in their lane.
    pub banned_spawns: u32,
    /// Due spawns skipped because every pool was exhausted.
    pub skipped_pool_exhausted: u32,
    /// Due spawns skipped because every lane was cooling down.
    pub skipped_no_lane: u32,

    // === Road ===
    /// Arrivals reported.
    pub arrivals: u32,
    /// Arrivals of banned cars.
    pub banned_arrivals: u32,
    /// Cars reclaimed by the watchdog.
    pub reclaimed: u32,

    // === Bans ===
    /// Timed rotations that changed the ban.
    pub rotations: u32,
    /// Timed rotations that found no eligible template.
    pub blocked_rotations: u32,
    /// Manual overrides applied.
    pub overrides_applied: u32,
    /// Manual overrides dropped.
    pub overrides_dropped: u32,

    // === Player ===
    /// Hits on banned cars.
    pub hits_scored: u32,
    /// Hits on cars that were not banned.
    pub hits_penalized: u32,
    /// Hits on protected cars.
    pub hits_protected: u32,
    /// Final score.
    pub score: u32,
    /// Health at the end of the round.
    pub final_health: u32,
    /// Tick at which the round ended.
    pub lost_at_tick: Option<u64>,

    /// Final controller state hash (for determinism validation).
    pub final_state_hash: u64,
}

impl RunMetrics {
    /// Create an empty record.
    #[must_use]
    pub fn new(scenario: impl Into<String>, seed: u64) -> Self {
        Self {
            scenario: scenario.into(),
            seed,
            ..Default::default()
        }
    }

    /// Fold one tick's events into the totals.
    pub fn record_tick(&mut self, events: &TickEvents) {
        self.spawns += events.spawned.len() as u32;
        self.banned_spawns += events.spawned.iter().filter(|s| s.banned).count() as u32;
        match events.skipped {
            Some(TrafficError::NoEligibleLane) => self.skipped_no_lane += 1,
            Some(TrafficError::NoAvailableTemplate | TrafficError::PoolExhausted(_)) => {
                self.skipped_pool_exhausted += 1;
            }
            _ => {}
        }
        self.reclaimed += events.reclaimed.len() as u32;

        for event in &events.ban_events {
            match event {
                BanEvent::Changed(change) if change.cause == BanCause::Override => {
                    self.overrides_applied += 1;
                }
                BanEvent::Changed(_) => self.rotations += 1,
                BanEvent::Blocked { .. } => self.blocked_rotations += 1,
                BanEvent::OverrideDropped { .. } => self.overrides_dropped += 1,
            }
        }
    }

    /// Record an arrival report.
    pub fn record_arrival(&mut self, outcome: &ArrivalOutcome) {
        if !outcome.released {
            return;
        }
        self.arrivals += 1;
        if outcome.banned {
            self.banned_arrivals += 1;
        }
    }

    /// Record a projectile hit.
    pub fn record_hit(&mut self, outcome: &HitOutcome) {
        match outcome {
            HitOutcome::Scored { .. } => self.hits_scored += 1,
            HitOutcome::Penalized { .. } => self.hits_penalized += 1,
            HitOutcome::Protected { .. } => self.hits_protected += 1,
            HitOutcome::Ignored => {}
        }
    }

    /// Share of spawns that were banned at spawn time.
    #[must_use]
    pub fn banned_share(&self) -> f64 {
        if self.spawns == 0 {
            return 0.0;
        }
        f64::from(self.banned_spawns) / f64::from(self.spawns)
    }

    /// Whether the round ended before the tick limit.
    #[must_use]
    pub const fn round_lost(&self) -> bool {
        self.lost_at_tick.is_some()
    }
}

/// Aggregate over many rounds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Rounds played.
    pub total_runs: u32,
    /// Rounds that ended before the tick limit.
    pub rounds_lost: u32,
    /// Mean share of banned spawns.
    pub mean_banned_share: f64,
    /// Mean timed rotations per round.
    pub mean_rotations: f64,
    /// Mean blocked rotations per round.
    pub mean_blocked_rotations: f64,
    /// Mean spawns skipped per round.
    pub mean_skipped_spawns: f64,
    /// Mean score per round.
    pub mean_score: f64,
    /// Mean tick at which lost rounds ended.
    pub mean_loss_tick: Option<f64>,
}

impl BatchSummary {
    /// Calculate a summary from a list of runs.
    #[must_use]
    pub fn from_runs(runs: &[RunMetrics]) -> Self {
        if runs.is_empty() {
            return Self::default();
        }
        let count = runs.len() as f64;
        let mean = |value: fn(&RunMetrics) -> f64| runs.iter().map(value).sum::<f64>() / count;

        let loss_ticks: Vec<u64> = runs.iter().filter_map(|run| run.lost_at_tick).collect();
        let mean_loss_tick = (!loss_ticks.is_empty())
            .then(|| loss_ticks.iter().sum::<u64>() as f64 / loss_ticks.len() as f64);

        Self {
            total_runs: runs.len() as u32,
            rounds_lost: loss_ticks.len() as u32,
            mean_banned_share: mean(RunMetrics::banned_share),
            mean_rotations: mean(|run| f64::from(run.rotations)),
            mean_blocked_rotations: mean(|run| f64::from(run.blocked_rotations)),
            mean_skipped_spawns: mean(|run| {
                f64::from(run.skipped_pool_exhausted + run.skipped_no_lane)
            }),
            mean_score: mean(|run| f64::from(run.score)),
            mean_loss_tick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use traffic_core::health::HealthReport;

    #[test]
    fn test_banned_share() {
        let mut metrics = RunMetrics::new("test", 0);
        assert_eq!(metrics.banned_share(), 0.0);
        metrics.spawns = 10;
        metrics.banned_spawns = 4;
        assert!((metrics.banned_share() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_record_tick_counts_skips_and_bans() {
        let mut metrics = RunMetrics::new("test", 0);
        let events = TickEvents {
            skipped: Some(TrafficError::NoEligibleLane),
            ban_events: vec![BanEvent::Blocked { group: 0 }],
            ..TickEvents::default()
        };
        metrics.record_tick(&events);
        assert_eq!(metrics.skipped_no_lane, 1);
        assert_eq!(metrics.blocked_rotations, 1);
    }

    #[test]
    fn test_summary() {
        let mut a = RunMetrics::new("test", 1);
        a.spawns = 10;
        a.banned_spawns = 5;
        a.rotations = 4;
        a.lost_at_tick = Some(100);
        let mut b = RunMetrics::new("test", 2);
        b.spawns = 10;
        b.banned_spawns = 3;
        b.rotations = 2;

        let summary = BatchSummary::from_runs(&[a, b]);
        assert_eq!(summary.total_runs, 2);
        assert_eq!(summary.rounds_lost, 1);
        assert!((summary.mean_banned_share - 0.4).abs() < 1e-9);
        assert!((summary.mean_rotations - 3.0).abs() < 1e-9);
        assert_eq!(summary.mean_loss_tick, Some(100.0));
        assert_eq!(BatchSummary::from_runs(&[]), BatchSummary::default());
    }

    #[test]
    fn test_record_hit_counts_protected() {
        let mut metrics = RunMetrics::new("test", 0);
        let health = HealthReport { current: 9, max: 10 };
        metrics.record_hit(&HitOutcome::Protected { health });
        metrics.record_hit(&HitOutcome::Penalized {
            health,
            round_over: false,
        });
        metrics.record_hit(&HitOutcome::Ignored);
        assert_eq!(metrics.hits_protected, 1);
        assert_eq!(metrics.hits_penalized, 1);
        assert_eq!(metrics.hits_scored, 0);
    }
}
