//! Safety net for instances that never report arrival.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::InstanceId;

/// Per-instance age tracker. Instances older than the timeout are handed back
/// to the caller for a forced release.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoReturnWatchdog {
    timeout: f32,
    ages: BTreeMap<InstanceId, f32>,
}

impl AutoReturnWatchdog {
    /// Create a watchdog reclaiming instances after `timeout` seconds.
    #[must_use]
    pub fn new(timeout: f32) -> Self {
        Self {
            timeout,
            ages: BTreeMap::new(),
        }
    }

    /// Start timing a freshly acquired instance.
    pub fn track(&mut self, instance: InstanceId) {
        self.ages.insert(instance, 0.0);
    }

    /// Stop timing an instance that left the road normally.
    pub fn forget(&mut self, instance: InstanceId) -> bool {
        self.ages.remove(&instance).is_some()
    }

    /// Age every tracked instance by `dt` and return (and stop tracking) the
    /// ones that reached the timeout, plus any for which `is_active` is false.
    pub fn tick(&mut self, dt: f32, mut is_active: impl FnMut(InstanceId) -> bool) -> Vec<InstanceId> {
        let timeout = self.timeout;
        let mut expired = Vec::new();
        self.ages.retain(|&instance, age| {
            if !is_active(instance) {
                expired.push(instance);
                return false;
            }
            *age += dt;
            if *age >= timeout {
                expired.push(instance);
                return false;
            }
            true
        });
        expired
    }

    /// Seconds an instance has been tracked.
    #[must_use]
    pub fn age(&self, instance: InstanceId) -> Option<f32> {
        self.ages.get(&instance).copied()
    }

    /// Number of tracked instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ages.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ages.is_empty()
    }

    /// Configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> f32 {
        self.timeout
    }

    /// Stop tracking everything.
    pub fn clear(&mut self) {
        self.ages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expires_after_timeout() {
        let mut watchdog = AutoReturnWatchdog::new(10.0);
        watchdog.track(InstanceId(1));
        assert!(watchdog.tick(6.0, |_| true).is_empty());
        watchdog.track(InstanceId(2));

        assert_eq!(watchdog.tick(4.0, |_| true), vec![InstanceId(1)]);
        assert_eq!(watchdog.age(InstanceId(2)), Some(4.0));
        assert_eq!(watchdog.len(), 1);
    }

    #[test]
    fn test_forget_stops_timing() {
        let mut watchdog = AutoReturnWatchdog::new(1.0);
        watchdog.track(InstanceId(3));
        assert!(watchdog.forget(InstanceId(3)));
        assert!(!watchdog.forget(InstanceId(3)));
        assert!(watchdog.tick(5.0, |_| true).is_empty());
    }

    #[test]
    fn test_inactive_instances_are_dropped() {
        let mut watchdog = AutoReturnWatchdog::new(100.0);
        watchdog.track(InstanceId(4));
        watchdog.track(InstanceId(5));
        let dropped = watchdog.tick(0.1, |id| id != InstanceId(4));
        assert_eq!(dropped, vec![InstanceId(4)]);
        assert!(watchdog.age(InstanceId(5)).is_some());
    }
}
