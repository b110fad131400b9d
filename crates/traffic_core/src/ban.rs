//! Ban rotation state machine.
//!
//! Every lane group carries its own [`BanState`]. A group moves from
//! `Unset` to `Banned(template)` at round start and then rotates to another
//! template whenever its rotation timer expires or a manual override is
//! requested.
//!
//! # Rotation Safety
//!
//! A template never becomes banned while one of its instances is already
//! driving in the group's lanes, and the ban never moves away while the
//! currently banned template is still on the road: a car keeps the ban
//! status it was spawned with until it leaves. The outgoing check can be
//! switched off with `guard_outgoing = false`; the incoming one cannot.
//!
//! Failed rotations are not errors in the fatal sense. The timer restarts
//! with a freshly sampled interval and the rotation is retried at the next
//! window.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::{BanSettings, TrafficConfig};
use crate::entity::{LaneId, TemplateId};
use crate::error::TrafficError;
use crate::rng::RandomSource;

/// Answers "is a live instance of this template in any of these lanes?".
pub trait Occupancy {
    /// Whether any lane in `lanes` holds an active instance of `template`.
    fn holds_template(&self, lanes: &[LaneId], template: TemplateId) -> bool;
}

/// Ban state of one lane group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BanState {
    /// No template is banned (between rounds).
    #[default]
    Unset,
    /// The given template is banned.
    Banned(TemplateId),
}

impl BanState {
    /// Banned template, if any.
    #[must_use]
    pub const fn template(self) -> Option<TemplateId> {
        match self {
            Self::Unset => None,
            Self::Banned(template) => Some(template),
        }
    }
}

/// What triggered a ban change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BanCause {
    /// Initial ban chosen at round start.
    RoundStart,
    /// Rotation timer expired.
    Timer,
    /// Manual override request.
    Override,
}

/// A completed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanChange {
    /// Lane group index.
    pub group: usize,
    /// Template banned before the change.
    pub previous: Option<TemplateId>,
    /// Newly banned template.
    pub current: TemplateId,
    /// Trigger.
    pub cause: BanCause,
}

/// Why a manual override request was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverrideRejection {
    /// No lane group with that index.
    UnknownGroup,
    /// No template at that index.
    UnknownIndex,
    /// The requested template is already banned.
    AlreadyBanned,
    /// The requested template cannot be shown on the sign.
    MissingMetadata,
    /// The requested template is protected and never banned.
    Protected,
    /// The requested template has a live instance in the group.
    TemplateActive,
    /// The outgoing banned template still has a live instance in the group.
    OutgoingActive,
}

/// Result of one rotation evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BanEvent {
    /// The ban moved to a new template.
    Changed(BanChange),
    /// A timed rotation found no eligible template; the ban stays put.
    Blocked {
        /// Lane group index.
        group: usize,
    },
    /// A manual override was dropped.
    OverrideDropped {
        /// Requested lane group.
        group: usize,
        /// Requested template index.
        index: usize,
        /// Reason.
        reason: OverrideRejection,
    },
}

/// Ban state and rotation timing for one lane group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanGroup {
    name: String,
    lanes: Vec<LaneId>,
    state: BanState,
    elapsed: f32,
    next_rotation: f32,
    weight: f32,
}

impl BanGroup {
    /// Group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lanes covered by the group.
    #[must_use]
    pub fn lanes(&self) -> &[LaneId] {
        &self.lanes
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> BanState {
        self.state
    }

    /// Seconds since the last rotation attempt.
    #[must_use]
    pub const fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Sampled deadline for the next rotation attempt.
    #[must_use]
    pub const fn next_rotation(&self) -> f32 {
        self.next_rotation
    }

    /// Current spawn weight of the banned template.
    #[must_use]
    pub const fn weight(&self) -> f32 {
        self.weight
    }
}

/// Owner of every group's ban state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanController {
    settings: BanSettings,
    /// All templates in configuration order; override indices refer to this.
    templates: Vec<TemplateId>,
    /// Templates without sign metadata, never chosen for a ban.
    excluded: BTreeSet<TemplateId>,
    protected: BTreeSet<TemplateId>,
    groups: Vec<BanGroup>,
    pending: Vec<(usize, usize)>,
}

impl BanController {
    /// Build the controller from configuration. All groups start `Unset`.
    #[must_use]
    pub fn new(config: &TrafficConfig) -> Self {
        let excluded: BTreeSet<_> = config
            .missing_metadata()
            .into_iter()
            .map(|template| {
                tracing::warn!(
                    template = %template.id,
                    name = %template.name,
                    "Template has no ban display asset; excluded from ban rotation"
                );
                template.id
            })
            .collect();

        let groups = config
            .resolved_groups()
            .into_iter()
            .map(|group| BanGroup {
                name: group.name,
                lanes: group.lanes,
                state: BanState::Unset,
                elapsed: 0.0,
                next_rotation: config.ban.max_time,
                weight: config.ban.spawn_weight,
            })
            .collect();

        Self {
            settings: config.ban.clone(),
            templates: config.templates.iter().map(|template| template.id).collect(),
            excluded,
            protected: config
                .templates
                .iter()
                .filter(|template| template.protected)
                .map(|template| template.id)
                .collect(),
            groups,
            pending: Vec::new(),
        }
    }

    /// Seed every group with a random ban and fresh timers.
    pub fn start_round(&mut self, rng: &mut impl RandomSource) -> Vec<BanChange> {
        self.pending.clear();
        let eligible: Vec<_> = self.ban_eligible().collect();
        let mut changes = Vec::new();

        for index in 0..self.groups.len() {
            let next_rotation = self.sample_interval(rng);
            let baseline = self.settings.spawn_weight;
            let group = &mut self.groups[index];
            let previous = group.state.template();

            group.elapsed = 0.0;
            group.next_rotation = next_rotation;
            group.weight = baseline;

            if eligible.is_empty() {
                group.state = BanState::Unset;
                tracing::warn!(group = %group.name, "No ban-eligible template; group stays unbanned");
                continue;
            }
            let current = eligible[rng.index(eligible.len())];
            group.state = BanState::Banned(current);
            tracing::info!(group = %group.name, banned = %current, "Initial ban");
            changes.push(BanChange {
                group: index,
                previous,
                current,
                cause: BanCause::RoundStart,
            });
        }
        changes
    }

    /// Return every group to `Unset` with idle timers.
    pub fn clear(&mut self) {
        self.pending.clear();
        for group in &mut self.groups {
            group.state = BanState::Unset;
            group.elapsed = 0.0;
            group.next_rotation = self.settings.max_time;
            group.weight = self.settings.spawn_weight;
        }
    }

    /// Advance rotation timers and weight growth by `dt` seconds, rotating
    /// every group whose deadline has passed.
    pub fn tick(
        &mut self,
        dt: f32,
        rng: &mut impl RandomSource,
        occupancy: &impl Occupancy,
    ) -> Vec<BanEvent> {
        let mut events = Vec::new();
        for index in 0..self.groups.len() {
            let group = &mut self.groups[index];
            if self.settings.weight_growth {
                group.weight += self.settings.weight_growth_per_second * dt;
            }
            group.elapsed += dt;
            if group.elapsed < group.next_rotation {
                continue;
            }

            let event = match self.rotate(index, rng, occupancy) {
                Ok(change) => BanEvent::Changed(change),
                Err(err) => {
                    tracing::warn!(error = %err, "Keeping current ban");
                    BanEvent::Blocked { group: index }
                }
            };
            events.push(event);
        }
        events
    }

    /// Attempt a timed rotation of one group.
    ///
    /// Timers restart whether or not a new template was found.
    ///
    /// # Errors
    ///
    /// [`TrafficError::BanRotationBlocked`] when the outgoing template (with
    /// `guard_outgoing`) or every candidate still has a live instance, and
    /// [`TrafficError::UnknownGroup`] for an out-of-range group.
    pub fn rotate(
        &mut self,
        group: usize,
        rng: &mut impl RandomSource,
        occupancy: &impl Occupancy,
    ) -> Result<BanChange, TrafficError> {
        if group >= self.groups.len() {
            return Err(TrafficError::UnknownGroup(group));
        }
        let next_rotation = self.sample_interval(rng);
        let state = &mut self.groups[group];
        state.elapsed = 0.0;
        state.next_rotation = next_rotation;

        let previous = state.state.template();
        let lanes = state.lanes.clone();
        if self.settings.guard_outgoing
            && previous.is_some_and(|banned| occupancy.holds_template(&lanes, banned))
        {
            tracing::debug!(group, "Outgoing banned template still on the road");
            return Err(TrafficError::BanRotationBlocked { group });
        }

        let mut candidates: Vec<_> = self
            .ban_eligible()
            .filter(|&template| Some(template) != previous)
            .collect();
        rng.shuffle(&mut candidates);

        let chosen = candidates
            .into_iter()
            .find(|&candidate| !occupancy.holds_template(&lanes, candidate))
            .ok_or(TrafficError::BanRotationBlocked { group })?;

        Ok(self.apply(group, chosen, BanCause::Timer))
    }

    /// Queue a manual override: ban the template at `index` (configuration
    /// order) in `group`. Evaluated by [`Self::apply_overrides`].
    pub fn request_override(&mut self, group: usize, index: usize) {
        self.pending.push((group, index));
    }

    /// Whether override requests are waiting.
    #[must_use]
    pub fn has_pending_overrides(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Evaluate queued override requests in order.
    pub fn apply_overrides(&mut self, occupancy: &impl Occupancy) -> Vec<BanEvent> {
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_iter()
            .map(|(group, index)| match self.try_override(group, index, occupancy) {
                Ok(change) => BanEvent::Changed(change),
                Err(reason) => {
                    tracing::info!(group, index, ?reason, "Ban override dropped");
                    BanEvent::OverrideDropped {
                        group,
                        index,
                        reason,
                    }
                }
            })
            .collect()
    }

    fn try_override(
        &mut self,
        group: usize,
        index: usize,
        occupancy: &impl Occupancy,
    ) -> Result<BanChange, OverrideRejection> {
        let state = self.groups.get(group).ok_or(OverrideRejection::UnknownGroup)?;
        let template = *self
            .templates
            .get(index)
            .ok_or(OverrideRejection::UnknownIndex)?;
        let previous = state.state.template();

        if previous == Some(template) {
            return Err(OverrideRejection::AlreadyBanned);
        }
        if self.protected.contains(&template) {
            return Err(OverrideRejection::Protected);
        }
        if self.excluded.contains(&template) {
            return Err(OverrideRejection::MissingMetadata);
        }
        if self.settings.guard_outgoing
            && previous.is_some_and(|banned| occupancy.holds_template(&state.lanes, banned))
        {
            return Err(OverrideRejection::OutgoingActive);
        }
        if occupancy.holds_template(&state.lanes, template) {
            return Err(OverrideRejection::TemplateActive);
        }

        Ok(self.apply(group, template, BanCause::Override))
    }

    fn apply(&mut self, group: usize, template: TemplateId, cause: BanCause) -> BanChange {
        let baseline = self.settings.spawn_weight;
        let state = &mut self.groups[group];
        let previous = state.state.template();
        state.state = BanState::Banned(template);
        state.weight = baseline;
        if cause == BanCause::Override {
            state.elapsed = 0.0;
        }
        tracing::info!(
            group = %state.name,
            from = ?previous,
            to = %template,
            ?cause,
            "Ban rotated"
        );
        BanChange {
            group,
            previous,
            current: template,
            cause,
        }
    }

    fn ban_eligible(&self) -> impl Iterator<Item = TemplateId> + '_ {
        self.templates
            .iter()
            .copied()
            .filter(|template| {
                !self.excluded.contains(template) && !self.protected.contains(template)
            })
    }

    fn sample_interval(&self, rng: &mut impl RandomSource) -> f32 {
        rng.range_f32(self.settings.min_time, self.settings.max_time)
    }

    /// Banned template of a group.
    #[must_use]
    pub fn banned(&self, group: usize) -> Option<TemplateId> {
        self.groups.get(group).and_then(|group| group.state.template())
    }

    /// Index of the group covering `lane`.
    #[must_use]
    pub fn group_of_lane(&self, lane: LaneId) -> Option<usize> {
        self.groups
            .iter()
            .position(|group| group.lanes.contains(&lane))
    }

    /// Banned template governing `lane`.
    #[must_use]
    pub fn banned_for_lane(&self, lane: LaneId) -> Option<TemplateId> {
        self.group_of_lane(lane).and_then(|group| self.banned(group))
    }

    /// Whether an instance of `template` driving in `lane` is banned.
    /// Unassigned instances are never banned.
    #[must_use]
    pub fn is_banned(&self, template: TemplateId, lane: Option<LaneId>) -> bool {
        lane.and_then(|lane| self.banned_for_lane(lane)) == Some(template)
    }

    /// Current banned spawn weight of a group (baseline for unknown groups).
    #[must_use]
    pub fn weight(&self, group: usize) -> f32 {
        self.groups
            .get(group)
            .map_or(self.settings.spawn_weight, BanGroup::weight)
    }

    /// Reset a group's banned spawn weight to the configured baseline.
    pub fn reset_weight(&mut self, group: usize) {
        if let Some(state) = self.groups.get_mut(group) {
            state.weight = self.settings.spawn_weight;
        }
    }

    /// Configured baseline weight.
    #[must_use]
    pub fn baseline_weight(&self) -> f32 {
        self.settings.spawn_weight
    }

    /// Every group in index order.
    #[must_use]
    pub fn groups(&self) -> &[BanGroup] {
        &self.groups
    }

    /// Templates excluded from rotation for lack of sign metadata.
    pub fn excluded(&self) -> impl Iterator<Item = TemplateId> + '_ {
        self.excluded.iter().copied()
    }
}
