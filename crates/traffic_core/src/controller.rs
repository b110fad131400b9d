//! The traffic controller.
//!
//! [`TrafficController`] owns the pools, the lane tracker, the cooldown
//! queue, the ban state machine, the spawn scheduler and the watchdog. Other
//! subsystems talk to it only through [`TrafficController::on_arrival`],
//! [`TrafficController::on_hit`], [`TrafficController::is_banned`] and the
//! notifications it emits.
//!
//! # Tick Order
//!
//! Each call to [`TrafficController::tick`] runs, in this order:
//! 1. **Spawn** - decide whether, where and what to spawn
//! 2. **Movement** - prune stale lane entries, then advance every car
//! 3. **Ban Rotation** - advance rotation timers and weight growth
//! 4. **Overrides** - apply queued manual ban requests
//! 5. **Watchdog** - reclaim cars that never arrived
//!
//! With the same seed and the same sequence of deltas, two controllers end
//! every tick with identical [`TrafficController::state_hash`] values.
//!
//! # Example
//!
//! ```
//! use traffic_core::config::TrafficConfig;
//! use traffic_core::controller::TrafficController;
//!
//! let mut controller = TrafficController::seeded(TrafficConfig::default(), 7).unwrap();
//! controller.start_round();
//!
//! let events = controller.tick(0.1);
//! assert_eq!(events.spawned.len(), 1);
//!
//! let car = events.spawned[0];
//! let outcome = controller.on_arrival(car.instance, car.lane);
//! assert!(outcome.released);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::ban::{BanChange, BanController, BanEvent, Occupancy};
use crate::config::TrafficConfig;
use crate::cooldown::CooldownQueue;
use crate::entity::{Instance, InstanceId, LaneId, Template, TemplateId};
use crate::error::{Result, TrafficError};
use crate::health::{DamageSink, Health, HealthReport};
use crate::lanes::LaneTracker;
use crate::placement::{LaneLayout, LanePlacement};
use crate::pool::PoolRegistry;
use crate::rng::{RandomSource, SeededRandom};
use crate::spawner::{choose_lane, choose_template, SpawnRecord, SpawnScheduler};
use crate::watchdog::AutoReturnWatchdog;

/// Lifecycle of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RoundState {
    /// No round in progress; ticks do nothing.
    #[default]
    Idle,
    /// Round in progress.
    Running,
    /// Health ran out or a protected car was hit; waiting for the host to
    /// clear the round.
    Over,
}

/// Outbound notifications for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Notification {
    /// Health changed.
    HealthChanged(HealthReport),
    /// A lane group's banned template changed.
    BanChanged(BanChange),
    /// The round is over.
    RoundOver,
}

/// Everything that happened during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickEvents {
    /// Cars spawned this tick.
    pub spawned: Vec<SpawnRecord>,
    /// Why a due spawn was skipped, if it was.
    pub skipped: Option<TrafficError>,
    /// Lane entries dropped because their instance was no longer active.
    pub pruned: Vec<InstanceId>,
    /// Ban rotations, blocked rotations and override outcomes.
    pub ban_events: Vec<BanEvent>,
    /// Cars force-released by the watchdog.
    pub reclaimed: Vec<InstanceId>,
}

/// Result of an arrival report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArrivalOutcome {
    /// Whether the instance was returned to its pool by this call.
    pub released: bool,
    /// Whether the instance was banned when it arrived.
    pub banned: bool,
    /// Health after damage, when damage was dealt.
    pub health: Option<HealthReport>,
    /// Whether this arrival ended the round.
    pub round_over: bool,
}

/// Result of a projectile hit report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitOutcome {
    /// Instance inactive or no round running.
    Ignored,
    /// A banned car was hit and removed.
    Scored {
        /// Score after the hit.
        score: u32,
    },
    /// A car that was not banned was hit.
    Penalized {
        /// Health after the penalty.
        health: HealthReport,
        /// Whether this hit ended the round.
        round_over: bool,
    },
    /// A protected car was hit. The round is over.
    Protected {
        /// Health after the penalty.
        health: HealthReport,
    },
}

/// Read-only view answering ban-safety queries.
struct RoadView<'a> {
    lanes: &'a LaneTracker,
    pools: &'a PoolRegistry,
}

impl Occupancy for RoadView<'_> {
    fn holds_template(&self, lanes: &[LaneId], template: TemplateId) -> bool {
        self.lanes.holds_template(lanes, template, self.pools)
    }
}

/// Lane traffic controller.
///
/// Generic over its random source and damage sink so hosts and tests can
/// inject their own; [`TrafficController::seeded`] builds the default
/// ChaCha-backed controller with a plain [`Health`] pool.
#[derive(Debug)]
pub struct TrafficController<R = SeededRandom, D = Health> {
    config: TrafficConfig,
    rng: R,
    damage: D,
    placement: Box<dyn LanePlacement>,
    pools: PoolRegistry,
    lanes: LaneTracker,
    cooldown: CooldownQueue,
    bans: BanController,
    scheduler: SpawnScheduler,
    watchdog: AutoReturnWatchdog,
    state: RoundState,
    clock: f32,
    tick: u64,
    score: u32,
    notifications: Vec<Notification>,
}

impl TrafficController {
    /// Build a controller with a seeded random source and a [`Health`] pool
    /// sized from the configuration.
    ///
    /// # Errors
    ///
    /// Any error from [`TrafficConfig::validate`].
    pub fn seeded(config: TrafficConfig, seed: u64) -> Result<Self> {
        let health = Health::new(config.health.max_health);
        Self::new(config, SeededRandom::new(seed), health)
    }
}

impl<R: RandomSource, D: DamageSink> TrafficController<R, D> {
    /// Validate `config` and allocate every pool.
    ///
    /// # Errors
    ///
    /// Any error from [`TrafficConfig::validate`]; this is the only point at
    /// which misconfiguration is fatal.
    pub fn new(config: TrafficConfig, rng: R, damage: D) -> Result<Self> {
        config.validate()?;

        let pools = PoolRegistry::new(&config.templates, config.pool.capacity);
        let lanes = LaneTracker::new(config.lanes.iter().map(|lane| lane.id));
        let placement = Box::new(LaneLayout::new(&config.lanes));

        Ok(Self {
            cooldown: CooldownQueue::new(config.spawn.cooldown_count),
            bans: BanController::new(&config),
            scheduler: SpawnScheduler::new(&config.spawn),
            watchdog: AutoReturnWatchdog::new(config.pool.auto_return_time),
            config,
            rng,
            damage,
            placement,
            pools,
            lanes,
            state: RoundState::Idle,
            clock: 0.0,
            tick: 0,
            score: 0,
            notifications: Vec::new(),
        })
    }

    /// Replace the lane placement service. Lanes without an anchor are
    /// skipped at spawn time.
    #[must_use]
    pub fn with_placement(mut self, placement: impl LanePlacement + 'static) -> Self {
        self.placement = Box::new(placement);
        self
    }

    // =========================================================================
    // Round lifecycle
    // =========================================================================

    /// Start a fresh round: clear leftovers, restore health, seed every lane
    /// group's ban and prime the spawn timer.
    pub fn start_round(&mut self) {
        self.clear_round();

        let health = self.damage.reset();
        self.notifications.push(Notification::HealthChanged(health));

        self.scheduler.reset();
        for change in self.bans.start_round(&mut self.rng) {
            self.notifications.push(Notification::BanChanged(change));
        }
        self.state = RoundState::Running;
        tracing::info!(
            lanes = self.config.lanes.len(),
            templates = self.config.templates.len(),
            "Round started"
        );
    }

    /// Force-release every active instance and clear all trackers, queues
    /// and timers. Returns the number of instances released.
    pub fn clear_round(&mut self) -> usize {
        let released = self.pools.release_all();
        self.lanes.clear();
        self.cooldown.clear();
        self.watchdog.clear();
        self.bans.clear();
        self.scheduler.clear();
        self.state = RoundState::Idle;
        self.clock = 0.0;
        self.tick = 0;
        self.score = 0;
        if released > 0 {
            tracing::debug!(released, "Round cleared");
        }
        released
    }

    fn end_round(&mut self, reason: &'static str) {
        self.state = RoundState::Over;
        self.notifications.push(Notification::RoundOver);
        tracing::info!(tick = self.tick, score = self.score, reason, "Round over");
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Advance the controller by `dt` seconds.
    ///
    /// Does nothing unless a round is running.
    pub fn tick(&mut self, dt: f32) -> TickEvents {
        let mut events = TickEvents::default();
        if self.state != RoundState::Running {
            return events;
        }
        self.clock += dt;
        self.tick += 1;

        // 1. Spawn
        self.scheduler.advance(dt);
        if self.scheduler.is_due() {
            match self.try_spawn() {
                Ok(record) => {
                    self.scheduler.mark_spawned();
                    events.spawned.push(record);
                }
                Err(err) => {
                    tracing::debug!(tick = self.tick, error = %err, "Spawn skipped");
                    events.skipped = Some(err);
                }
            }
        }

        // 2. Movement
        events.pruned = self.run_movement_system(dt);

        // 3. Ban rotation
        let road = RoadView {
            lanes: &self.lanes,
            pools: &self.pools,
        };
        events.ban_events = self.bans.tick(dt, &mut self.rng, &road);

        // 4. Manual overrides
        if self.bans.has_pending_overrides() {
            let overrides = self.bans.apply_overrides(&road);
            events.ban_events.extend(overrides);
        }
        for event in &events.ban_events {
            if let BanEvent::Changed(change) = event {
                self.notifications.push(Notification::BanChanged(*change));
            }
        }

        // 5. Watchdog
        events.reclaimed = self.run_watchdog_system(dt);

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::trace!(tick = self.tick, state_hash = hash, "Controller state hash");
        }

        events
    }

    /// Spawn one car if a lane and a template are available.
    fn try_spawn(&mut self) -> Result<SpawnRecord> {
        let lane = choose_lane(self.lanes.lane_ids(), &self.cooldown, &mut self.rng)
            .ok_or(TrafficError::NoEligibleLane)?;
        let anchor = self
            .placement
            .anchor(lane)
            .ok_or(TrafficError::UnknownLane(lane))?;

        let group = self.bans.group_of_lane(lane);
        let banned = group.and_then(|group| self.bans.banned(group));
        let weight = group.map_or(self.bans.baseline_weight(), |group| self.bans.weight(group));

        let eligible: Vec<_> = self
            .config
            .templates
            .iter()
            .map(|template| template.id)
            .filter(|&template| self.pools.is_available(template))
            .collect();
        let template = choose_template(&eligible, banned, weight, &mut self.rng)
            .ok_or(TrafficError::NoAvailableTemplate)?;

        let id = self.pools.acquire(template, self.clock)?;
        if let Err(err) = self.lanes.register(lane, id) {
            self.pools.release(id);
            return Err(err);
        }
        let instance = self
            .pools
            .get_mut(id)
            .ok_or(TrafficError::UnknownTemplate(template))?;
        instance.place(lane, anchor);
        let record = SpawnRecord {
            instance: id,
            template,
            lane,
            position: instance.position,
            heading: instance.heading,
            banned: banned == Some(template),
        };

        self.cooldown.push(lane);
        self.watchdog.track(id);
        if record.banned {
            if let Some(group) = group {
                self.bans.reset_weight(group);
            }
        }

        tracing::debug!(
            tick = self.tick,
            %lane,
            %template,
            instance = %id,
            banned = record.banned,
            "Spawned car"
        );
        Ok(record)
    }

    fn run_movement_system(&mut self, dt: f32) -> Vec<InstanceId> {
        let pools = &self.pools;
        let pruned = self.lanes.prune(|id| pools.is_active(id));
        for id in &pruned {
            self.watchdog.forget(*id);
            tracing::debug!(instance = %id, "Pruned inactive lane entry");
        }

        let distance = self.config.movement_speed * dt;
        let moving: Vec<_> = self.lanes.instances().map(|(_, id)| id).collect();
        for id in moving {
            if let Some(instance) = self.pools.get_mut(id) {
                instance.advance(distance);
            }
        }
        pruned
    }

    fn run_watchdog_system(&mut self, dt: f32) -> Vec<InstanceId> {
        let pools = &self.pools;
        let expired = self.watchdog.tick(dt, |id| pools.is_active(id));

        let mut reclaimed = Vec::new();
        for id in expired {
            let Some(lane) = self.pools.get(id).filter(|i| i.active).and_then(|i| i.lane) else {
                continue;
            };
            self.lanes.remove(lane, id);
            if self.pools.release(id) {
                tracing::debug!(
                    instance = %id,
                    timeout = self.watchdog.timeout(),
                    "Auto-returned car that never arrived"
                );
                reclaimed.push(id);
            }
        }
        reclaimed
    }

    // =========================================================================
    // Boundary operations
    // =========================================================================

    /// Whether `instance` is currently banned in the lane it drives in.
    #[must_use]
    pub fn is_banned(&self, instance: InstanceId) -> bool {
        self.pools
            .get(instance)
            .filter(|instance| instance.active)
            .is_some_and(|instance| self.bans.is_banned(instance.template, instance.lane))
    }

    fn is_protected(&self, instance: InstanceId) -> bool {
        self.pools
            .get(instance)
            .and_then(|instance| self.template(instance.template))
            .is_some_and(|template| template.protected)
    }

    fn template(&self, id: TemplateId) -> Option<&Template> {
        self.config.templates.iter().find(|template| template.id == id)
    }

    /// A car reached the end of `lane`.
    ///
    /// Banned cars damage the player. Either way the car leaves the lane and
    /// returns to its pool. Reports for cars that are already pooled change
    /// nothing.
    pub fn on_arrival(&mut self, instance: InstanceId, lane: LaneId) -> ArrivalOutcome {
        let mut outcome = ArrivalOutcome::default();
        let Some(current_lane) = self
            .pools
            .get(instance)
            .filter(|i| i.active)
            .map(|i| i.lane)
        else {
            self.lanes.remove(lane, instance);
            return outcome;
        };

        outcome.banned = self.is_banned(instance);
        if outcome.banned && self.state == RoundState::Running {
            let report = self
                .damage
                .take_damage(self.config.health.damage_per_banned_arrival);
            outcome.health = Some(report);
            outcome.round_over = self.report_health(report);
        }

        self.lanes.remove(lane, instance);
        if let Some(current) = current_lane.filter(|&current| current != lane) {
            self.lanes.remove(current, instance);
        }
        self.watchdog.forget(instance);
        outcome.released = self.pools.release(instance);

        tracing::debug!(
            %instance,
            %lane,
            banned = outcome.banned,
            "Car arrived"
        );
        outcome
    }

    /// A projectile hit `instance`.
    ///
    /// Hitting a banned car scores and removes it; hitting any other car
    /// costs health and leaves it driving. Hitting a protected car costs
    /// health and ends the round on the spot.
    pub fn on_hit(&mut self, instance: InstanceId) -> HitOutcome {
        if self.state != RoundState::Running {
            return HitOutcome::Ignored;
        }
        let Some(lane) = self
            .pools
            .get(instance)
            .filter(|i| i.active)
            .map(|i| i.lane)
        else {
            return HitOutcome::Ignored;
        };

        if self.is_protected(instance) {
            let health = self
                .damage
                .take_damage(self.config.health.damage_per_wrong_hit);
            self.report_health(health);
            if self.state == RoundState::Running {
                self.end_round("protected car hit");
            }
            tracing::debug!(%instance, health = health.current, "Protected car hit");
            return HitOutcome::Protected { health };
        }

        if self.is_banned(instance) {
            self.score += self.config.health.score_per_banned_hit;
            if let Some(lane) = lane {
                self.lanes.remove(lane, instance);
            }
            self.watchdog.forget(instance);
            self.pools.release(instance);
            tracing::debug!(%instance, score = self.score, "Banned car hit");
            return HitOutcome::Scored { score: self.score };
        }

        let health = self
            .damage
            .take_damage(self.config.health.damage_per_wrong_hit);
        let round_over = self.report_health(health);
        tracing::debug!(%instance, health = health.current, "Wrong car hit");
        HitOutcome::Penalized { health, round_over }
    }

    /// Forward a health change and end the round immediately on depletion.
    fn report_health(&mut self, report: HealthReport) -> bool {
        self.notifications.push(Notification::HealthChanged(report));
        if report.is_depleted() && self.state == RoundState::Running {
            self.end_round("health depleted");
            return true;
        }
        false
    }

    /// Queue a manual override banning the template at `template_index`
    /// (configuration order) in lane group `group`. Applied on the next tick
    /// after the timed rotation check.
    pub fn request_ban(&mut self, group: usize, template_index: usize) {
        self.bans.request_override(group, template_index);
    }

    /// Take every notification emitted since the last call.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current round state.
    #[must_use]
    pub const fn state(&self) -> RoundState {
        self.state
    }

    /// Seconds since round start.
    #[must_use]
    pub const fn clock(&self) -> f32 {
        self.clock
    }

    /// Ticks since round start.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Score from banned hits this round.
    #[must_use]
    pub const fn score(&self) -> u32 {
        self.score
    }

    /// Current health.
    #[must_use]
    pub fn health(&self) -> HealthReport {
        self.damage.report()
    }

    /// Configuration the controller was built from.
    #[must_use]
    pub fn config(&self) -> &TrafficConfig {
        &self.config
    }

    /// Instance pools.
    #[must_use]
    pub fn pools(&self) -> &PoolRegistry {
        &self.pools
    }

    /// Lane tracker.
    #[must_use]
    pub fn lanes(&self) -> &LaneTracker {
        &self.lanes
    }

    /// Recent spawn lanes.
    #[must_use]
    pub fn cooldown(&self) -> &CooldownQueue {
        &self.cooldown
    }

    /// Ban state machine.
    #[must_use]
    pub fn bans(&self) -> &BanController {
        &self.bans
    }

    /// Spawn timer.
    #[must_use]
    pub fn scheduler(&self) -> &SpawnScheduler {
        &self.scheduler
    }

    /// Auto-return watchdog.
    #[must_use]
    pub fn watchdog(&self) -> &AutoReturnWatchdog {
        &self.watchdog
    }

    /// Lane placement service.
    #[must_use]
    pub fn placement(&self) -> &dyn LanePlacement {
        self.placement.as_ref()
    }

    /// Look up an instance.
    #[must_use]
    pub fn instance(&self, id: InstanceId) -> Option<&Instance> {
        self.pools.get(id)
    }

    /// Every active instance in lane order.
    pub fn active_instances(&self) -> impl Iterator<Item = &Instance> + '_ {
        self.lanes
            .instances()
            .filter_map(|(_, id)| self.pools.get(id))
    }

    /// Compute a hash of the full controller state.
    ///
    /// Floats are hashed by bit pattern, collections in deterministic order.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);
        self.clock.to_bits().hash(&mut hasher);
        self.score.hash(&mut hasher);
        self.state.hash(&mut hasher);
        self.damage.report().current.hash(&mut hasher);

        for instance in self.pools.instances() {
            instance.id.hash(&mut hasher);
            instance.active.hash(&mut hasher);
            instance.lane.hash(&mut hasher);
            instance.position.x.to_bits().hash(&mut hasher);
            instance.position.z.to_bits().hash(&mut hasher);
        }
        for (lane, id) in self.lanes.instances() {
            lane.hash(&mut hasher);
            id.hash(&mut hasher);
        }
        for lane in self.cooldown.iter() {
            lane.hash(&mut hasher);
        }
        for group in self.bans.groups() {
            group.state().hash(&mut hasher);
            group.elapsed().to_bits().hash(&mut hasher);
            group.next_rotation().to_bits().hash(&mut hasher);
            group.weight().to_bits().hash(&mut hasher);
        }
        self.scheduler.timer().to_bits().hash(&mut hasher);
        self.watchdog.len().hash(&mut hasher);

        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ban::BanState;
    use crate::entity::Position;
    use crate::placement::LaneConfig;

    fn controller(seed: u64) -> TrafficController {
        TrafficController::seeded(TrafficConfig::default(), seed).unwrap()
    }

    /// Spawn one car and return its record.
    fn spawn_one(controller: &mut TrafficController) -> SpawnRecord {
        loop {
            let events = controller.tick(0.5);
            if let Some(record) = events.spawned.first() {
                return *record;
            }
        }
    }

    /// Spawn until a car of the banned template appears.
    fn spawn_banned(controller: &mut TrafficController) -> SpawnRecord {
        for _ in 0..500 {
            let record = spawn_one(controller);
            if controller.is_banned(record.instance) {
                return record;
            }
            controller.on_arrival(record.instance, record.lane);
        }
        panic!("no banned car spawned");
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = TrafficConfig::default();
        config.templates.clear();
        assert!(matches!(
            TrafficController::seeded(config, 0),
            Err(TrafficError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_idle_controller_does_not_tick() {
        let mut controller = controller(0);
        let events = controller.tick(5.0);
        assert_eq!(events, TickEvents::default());
        assert_eq!(controller.tick_count(), 0);
    }

    #[test]
    fn test_start_round_spawns_on_first_tick() {
        let mut controller = controller(1);
        controller.start_round();
        assert_eq!(controller.state(), RoundState::Running);

        let events = controller.tick(0.016);
        assert_eq!(events.spawned.len(), 1);
        let record = events.spawned[0];
        assert_eq!(controller.lanes().lane(record.lane), &[record.instance]);
        assert!(controller.cooldown().contains(record.lane));

        let instance = controller.instance(record.instance).unwrap();
        assert_eq!(instance.lane, Some(record.lane));
        assert!(instance.travelled > 0.0);
    }

    #[test]
    fn test_spawn_heading_mirrors_anchor_side() {
        let mut controller = controller(2);
        controller.start_round();
        for _ in 0..20 {
            let record = spawn_one(&mut controller);
            let anchor = controller.placement().anchor(record.lane).unwrap();
            if anchor.x < 0.0 {
                assert_eq!(record.heading.direction_x(), 1.0);
            } else {
                assert_eq!(record.heading.direction_x(), -1.0);
            }
            controller.on_arrival(record.instance, record.lane);
        }
    }

    #[test]
    fn test_banned_arrival_damages_and_releases() {
        let mut controller = controller(3);
        controller.start_round();
        controller.drain_notifications();
        let record = spawn_banned(&mut controller);

        let outcome = controller.on_arrival(record.instance, record.lane);
        assert!(outcome.banned);
        assert!(outcome.released);
        assert_eq!(outcome.health.map(|h| h.current), Some(9));
        assert!(!controller.pools().is_active(record.instance));
        assert!(controller
            .drain_notifications()
            .contains(&Notification::HealthChanged(HealthReport { current: 9, max: 10 })));

        let again = controller.on_arrival(record.instance, record.lane);
        assert_eq!(again, ArrivalOutcome::default());
        assert_eq!(controller.health().current, 9);
    }

    #[test]
    fn test_normal_arrival_deals_no_damage() {
        let mut controller = controller(4);
        controller.start_round();
        let record = loop {
            let record = spawn_one(&mut controller);
            if !controller.is_banned(record.instance) {
                break record;
            }
            controller.on_arrival(record.instance, record.lane);
        };
        let before = controller.health();

        let outcome = controller.on_arrival(record.instance, record.lane);
        assert!(!outcome.banned);
        assert!(outcome.released);
        assert_eq!(outcome.health, None);
        assert_eq!(controller.health().current, before.current);
    }

    #[test]
    fn test_depletion_ends_round_immediately() {
        let mut config = TrafficConfig::default();
        config.health.max_health = 1;
        let mut controller = TrafficController::seeded(config, 5).unwrap();
        controller.start_round();
        let record = spawn_banned(&mut controller);

        let outcome = controller.on_arrival(record.instance, record.lane);
        assert!(outcome.round_over);
        assert_eq!(controller.state(), RoundState::Over);
        assert!(controller
            .drain_notifications()
            .contains(&Notification::RoundOver));
        assert_eq!(controller.tick(1.0), TickEvents::default());
    }

    #[test]
    fn test_hit_banned_scores_and_removes() {
        let mut controller = controller(6);
        controller.start_round();
        let record = spawn_banned(&mut controller);

        assert_eq!(
            controller.on_hit(record.instance),
            HitOutcome::Scored { score: 1 }
        );
        assert!(!controller.pools().is_active(record.instance));
        assert!(controller.lanes().lane_of(record.instance).is_none());
        assert_eq!(controller.on_hit(record.instance), HitOutcome::Ignored);
    }

    #[test]
    fn test_hit_normal_car_costs_health() {
        let mut controller = controller(7);
        controller.start_round();
        let record = loop {
            let record = spawn_one(&mut controller);
            if !controller.is_banned(record.instance) {
                break record;
            }
            controller.on_arrival(record.instance, record.lane);
        };
        let before = controller.health().current;

        match controller.on_hit(record.instance) {
            HitOutcome::Penalized { health, round_over } => {
                assert_eq!(health.current, before - 1);
                assert!(!round_over);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(controller.pools().is_active(record.instance));
    }

    #[test]
    fn test_hit_protected_car_ends_round() {
        let ambulance = TemplateId(4);
        let mut config = TrafficConfig::default();
        config
            .templates
            .push(Template::new(ambulance, "ambulance").as_protected());
        config.health.damage_per_banned_arrival = 0;
        let mut controller = TrafficController::seeded(config, 13).unwrap();
        controller.start_round();

        let record = loop {
            let record = spawn_one(&mut controller);
            assert_ne!(controller.bans().banned(0), Some(ambulance));
            if record.template == ambulance {
                break record;
            }
            controller.on_arrival(record.instance, record.lane);
        };
        assert!(!controller.is_banned(record.instance));
        controller.drain_notifications();

        let outcome = controller.on_hit(record.instance);
        assert_eq!(
            outcome,
            HitOutcome::Protected {
                health: HealthReport { current: 9, max: 10 }
            }
        );
        assert_eq!(controller.state(), RoundState::Over);
        assert_eq!(controller.score(), 0);
        let notifications = controller.drain_notifications();
        assert!(notifications.contains(&Notification::RoundOver));
        assert_eq!(
            notifications
                .iter()
                .filter(|n| **n == Notification::RoundOver)
                .count(),
            1
        );
        assert_eq!(controller.on_hit(record.instance), HitOutcome::Ignored);
    }

    #[test]
    fn test_protected_arrival_is_an_ordinary_arrival() {
        let ambulance = TemplateId(4);
        let mut config = TrafficConfig::default();
        config
            .templates
            .push(Template::new(ambulance, "ambulance").as_protected());
        config.health.damage_per_banned_arrival = 0;
        let mut controller = TrafficController::seeded(config, 14).unwrap();
        controller.start_round();

        let record = loop {
            let record = spawn_one(&mut controller);
            if record.template == ambulance {
                break record;
            }
            controller.on_arrival(record.instance, record.lane);
        };
        let outcome = controller.on_arrival(record.instance, record.lane);
        assert!(outcome.released);
        assert!(!outcome.banned);
        assert_eq!(controller.health().current, 10);
        assert_eq!(controller.state(), RoundState::Running);
    }

    #[test]
    fn test_watchdog_reclaims_without_damage() {
        let mut config = TrafficConfig::default();
        config.pool.auto_return_time = 1.0;
        config.spawn.interval = 100.0;
        let mut controller = TrafficController::seeded(config, 8).unwrap();
        controller.start_round();

        let first = controller.tick(0.1);
        let record = first.spawned[0];
        let mut reclaimed = Vec::new();
        for _ in 0..20 {
            reclaimed.extend(controller.tick(0.1).reclaimed);
        }

        assert_eq!(reclaimed, vec![record.instance]);
        assert!(controller.lanes().is_empty());
        assert_eq!(controller.health().current, 10);
    }

    #[test]
    fn test_clear_then_start_resets_everything() {
        let mut controller = controller(9);
        controller.start_round();
        for _ in 0..40 {
            controller.tick(0.5);
        }
        assert!(controller.pools().total_active() > 0);

        controller.clear_round();
        assert_eq!(controller.pools().total_active(), 0);
        assert!(controller.lanes().is_empty());
        assert!(controller.cooldown().is_empty());
        assert_eq!(controller.bans().groups()[0].state(), BanState::Unset);

        controller.start_round();
        assert_eq!(controller.pools().total_active(), 0);
        let group = &controller.bans().groups()[0];
        assert!(matches!(group.state(), BanState::Banned(_)));
        assert_eq!(group.elapsed(), 0.0);
    }

    #[test]
    fn test_request_ban_applies_on_next_tick() {
        let mut config = TrafficConfig::default();
        config.spawn.interval = 1000.0;
        config.spawn.first_spawn_immediate = false;
        let mut controller = TrafficController::seeded(config, 10).unwrap();
        controller.start_round();
        let current = controller.bans().banned(0).unwrap();
        let target = (current.0 as usize + 1) % 4;

        controller.request_ban(0, target);
        let events = controller.tick(0.01);
        assert!(events
            .ban_events
            .iter()
            .any(|event| matches!(event, BanEvent::Changed(change) if change.current.0 as usize == target)));
        assert_eq!(controller.bans().banned(0), Some(TemplateId(target as u32)));
    }

    #[test]
    fn test_lane_without_anchor_is_skipped() {
        #[derive(Debug)]
        struct NoAnchors;
        impl LanePlacement for NoAnchors {
            fn anchor(&self, _lane: LaneId) -> Option<Position> {
                None
            }
            fn length(&self, _lane: LaneId) -> Option<f32> {
                None
            }
        }

        let mut config = TrafficConfig::default();
        config.lanes = vec![LaneConfig::new(LaneId(0), Position::ZERO, 10.0)];
        let mut controller = TrafficController::seeded(config, 11)
            .unwrap()
            .with_placement(NoAnchors);
        controller.start_round();

        let events = controller.tick(0.1);
        assert!(events.spawned.is_empty());
        assert_eq!(events.skipped, Some(TrafficError::UnknownLane(LaneId(0))));
        assert_eq!(controller.pools().total_active(), 0);
    }

    #[test]
    fn test_same_seed_same_hash() {
        let mut a = controller(12);
        let mut b = controller(12);
        a.start_round();
        b.start_round();
        for _ in 0..200 {
            a.tick(0.05);
            b.tick(0.05);
            assert_eq!(a.state_hash(), b.state_hash());
        }
    }
}
