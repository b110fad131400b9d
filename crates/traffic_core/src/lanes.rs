//! Per-lane tracking of active instances.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::{InstanceId, LaneId, TemplateId};
use crate::error::{Result, TrafficError};
use crate::pool::PoolRegistry;

/// Ordered lists of the instances currently driving in each lane.
///
/// Iteration is always in lane order, then spawn order within a lane.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaneTracker {
    lanes: BTreeMap<LaneId, Vec<InstanceId>>,
}

impl LaneTracker {
    /// Create an empty tracker for the given lanes.
    #[must_use]
    pub fn new(lanes: impl IntoIterator<Item = LaneId>) -> Self {
        Self {
            lanes: lanes.into_iter().map(|lane| (lane, Vec::new())).collect(),
        }
    }

    /// Append an instance to a lane.
    ///
    /// # Errors
    ///
    /// [`TrafficError::UnknownLane`] if the lane was not part of the layout.
    pub fn register(&mut self, lane: LaneId, instance: InstanceId) -> Result<()> {
        let list = self
            .lanes
            .get_mut(&lane)
            .ok_or(TrafficError::UnknownLane(lane))?;
        list.push(instance);
        Ok(())
    }

    /// Remove an instance from a lane by identity.
    ///
    /// Returns `false` if it was not there, which makes double removal safe.
    pub fn remove(&mut self, lane: LaneId, instance: InstanceId) -> bool {
        let Some(list) = self.lanes.get_mut(&lane) else {
            return false;
        };
        match list.iter().position(|&id| id == instance) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        }
    }

    /// Drop every reference for which `is_active` returns false.
    ///
    /// Catches instances that left the road through a path other than
    /// arrival. Returns the pruned IDs.
    pub fn prune(&mut self, mut is_active: impl FnMut(InstanceId) -> bool) -> Vec<InstanceId> {
        let mut pruned = Vec::new();
        for list in self.lanes.values_mut() {
            list.retain(|&id| {
                let keep = is_active(id);
                if !keep {
                    pruned.push(id);
                }
                keep
            });
        }
        pruned
    }

    /// Whether any of `lanes` holds an active instance of `template`.
    #[must_use]
    pub fn holds_template(
        &self,
        lanes: &[LaneId],
        template: TemplateId,
        pools: &PoolRegistry,
    ) -> bool {
        lanes
            .iter()
            .filter_map(|lane| self.lanes.get(lane))
            .flatten()
            .any(|&id| {
                pools
                    .get(id)
                    .is_some_and(|instance| instance.active && instance.template == template)
            })
    }

    /// Instances currently in `lane` (empty for unknown lanes).
    #[must_use]
    pub fn lane(&self, lane: LaneId) -> &[InstanceId] {
        self.lanes.get(&lane).map(Vec::as_slice).unwrap_or_default()
    }

    /// Lane currently holding `instance`, if any.
    #[must_use]
    pub fn lane_of(&self, instance: InstanceId) -> Option<LaneId> {
        self.lanes
            .iter()
            .find(|(_, list)| list.contains(&instance))
            .map(|(&lane, _)| lane)
    }

    /// Whether `lane` is part of the layout.
    #[must_use]
    pub fn has_lane(&self, lane: LaneId) -> bool {
        self.lanes.contains_key(&lane)
    }

    /// All lane IDs in order.
    pub fn lane_ids(&self) -> impl Iterator<Item = LaneId> + '_ {
        self.lanes.keys().copied()
    }

    /// Every tracked `(lane, instance)` pair in deterministic order.
    pub fn instances(&self) -> impl Iterator<Item = (LaneId, InstanceId)> + '_ {
        self.lanes
            .iter()
            .flat_map(|(&lane, list)| list.iter().map(move |&id| (lane, id)))
    }

    /// Total tracked instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lanes.values().map(Vec::len).sum()
    }

    /// Whether no lane holds anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.values().all(Vec::is_empty)
    }

    /// Empty every lane, keeping the layout.
    pub fn clear(&mut self) {
        for list in self.lanes.values_mut() {
            list.clear();
        }
    }
}
