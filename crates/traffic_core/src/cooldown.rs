//! Bounded history of recently used spawn lanes.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::entity::LaneId;

/// FIFO of the most recent spawn lanes. A lane in the queue may not be used
/// for another spawn until it has been evicted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownQueue {
    capacity: usize,
    recent: VecDeque<LaneId>,
}

impl CooldownQueue {
    /// Create an empty queue holding at most `capacity` lanes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            recent: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Record a spawn in `lane`, evicting the oldest entries beyond capacity.
    ///
    /// Returns the lanes that became eligible again.
    pub fn push(&mut self, lane: LaneId) -> Vec<LaneId> {
        self.recent.push_back(lane);
        let mut freed = Vec::new();
        while self.recent.len() > self.capacity {
            if let Some(oldest) = self.recent.pop_front() {
                tracing::trace!(%oldest, "Lane available for spawning again");
                freed.push(oldest);
            }
        }
        freed
    }

    /// Whether `lane` is still cooling down.
    #[must_use]
    pub fn contains(&self, lane: LaneId) -> bool {
        self.recent.contains(&lane)
    }

    /// Lanes from `lanes` that are not cooling down, in input order.
    #[must_use]
    pub fn eligible(&self, lanes: impl IntoIterator<Item = LaneId>) -> Vec<LaneId> {
        lanes.into_iter().filter(|&lane| !self.contains(lane)).collect()
    }

    /// Configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of lanes currently cooling down.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recent.len()
    }

    /// Whether nothing is cooling down.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }

    /// Cooling lanes, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = LaneId> + '_ {
        self.recent.iter().copied()
    }

    /// Forget every lane.
    pub fn clear(&mut self) {
        self.recent.clear();
    }
}
