//! Fixed-capacity instance pools, one per template.
//!
//! All instances are allocated once when the registry is built and are
//! never destroyed during a round. An instance is either in its pool's free
//! list or in its pool's active set, never both:
//!
//! ```text
//! free_count(template) + active_count(template) == capacity(template)
//! ```
//!
//! # Example
//!
//! ```
//! use traffic_core::entity::{Template, TemplateId};
//! use traffic_core::pool::PoolRegistry;
//!
//! let templates = vec![Template::new(TemplateId(0), "sedan")];
//! let mut pools = PoolRegistry::new(&templates, 2);
//!
//! let car = pools.acquire(TemplateId(0), 0.0).unwrap();
//! assert_eq!(pools.free_count(TemplateId(0)), 1);
//!
//! assert!(pools.release(car));
//! assert!(!pools.release(car));
//! assert_eq!(pools.free_count(TemplateId(0)), 2);
//! ```

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::entity::{Instance, InstanceId, Template, TemplateId};
use crate::error::{Result, TrafficError};

/// Free/active bookkeeping for a single template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityPool {
    capacity: usize,
    free: VecDeque<InstanceId>,
    active: BTreeSet<InstanceId>,
}

impl EntityPool {
    fn with_instances(ids: impl IntoIterator<Item = InstanceId>) -> Self {
        let free: VecDeque<_> = ids.into_iter().collect();
        Self {
            capacity: free.len(),
            free,
            active: BTreeSet::new(),
        }
    }

    /// Allocated capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of instances waiting in the free list.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Number of instances currently out on the road.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Whether `id` sits in the free list.
    #[must_use]
    pub fn is_free(&self, id: InstanceId) -> bool {
        self.free.contains(&id)
    }

    /// Whether `id` is in the active set.
    #[must_use]
    pub fn is_active(&self, id: InstanceId) -> bool {
        self.active.contains(&id)
    }
}

/// Owner of every instance and of one [`EntityPool`] per template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolRegistry {
    instances: Vec<Instance>,
    pools: BTreeMap<TemplateId, EntityPool>,
}

impl PoolRegistry {
    /// Allocate `capacity` instances for every template.
    #[must_use]
    pub fn new(templates: &[Template], capacity: usize) -> Self {
        let mut instances = Vec::with_capacity(templates.len() * capacity);
        let mut pools = BTreeMap::new();

        for template in templates {
            let first = instances.len() as u32;
            for offset in 0..capacity as u32 {
                instances.push(Instance::pooled(InstanceId(first + offset), template.id));
            }
            let ids = (first..first + capacity as u32).map(InstanceId);
            pools.insert(template.id, EntityPool::with_instances(ids));
        }

        tracing::debug!(
            templates = templates.len(),
            capacity,
            "Instance pools initialized"
        );

        Self { instances, pools }
    }

    /// Take a free instance of `template` out of its pool.
    ///
    /// The instance comes back active with its lane unassigned; the caller is
    /// expected to place it.
    ///
    /// # Errors
    ///
    /// [`TrafficError::PoolExhausted`] when every instance is in use,
    /// [`TrafficError::UnknownTemplate`] when `template` has no pool.
    pub fn acquire(&mut self, template: TemplateId, now: f32) -> Result<InstanceId> {
        let pool = self
            .pools
            .get_mut(&template)
            .ok_or(TrafficError::UnknownTemplate(template))?;
        let id = pool
            .free
            .pop_front()
            .ok_or(TrafficError::PoolExhausted(template))?;
        pool.active.insert(id);

        let instance = &mut self.instances[id.0 as usize];
        instance.active = true;
        instance.lane = None;
        instance.acquired_at = now;
        instance.travelled = 0.0;
        Ok(id)
    }

    /// Return an instance to its pool.
    ///
    /// Returns `false` without touching anything if the instance is unknown or
    /// already pooled, so double releases are harmless.
    pub fn release(&mut self, id: InstanceId) -> bool {
        let Some(instance) = self.instances.get_mut(id.0 as usize) else {
            return false;
        };
        if !instance.active {
            return false;
        }
        instance.active = false;
        instance.lane = None;

        let Some(pool) = self.pools.get_mut(&instance.template) else {
            return false;
        };
        pool.active.remove(&id);
        pool.free.push_back(id);
        true
    }

    /// Release every active instance. Returns how many were released.
    pub fn release_all(&mut self) -> usize {
        let active = self.active_ids();
        active.into_iter().filter(|&id| self.release(id)).count()
    }

    /// Look up an instance.
    #[must_use]
    pub fn get(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.get(id.0 as usize)
    }

    /// Look up an instance mutably.
    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut Instance> {
        self.instances.get_mut(id.0 as usize)
    }

    /// Whether `id` is currently out of its pool.
    #[must_use]
    pub fn is_active(&self, id: InstanceId) -> bool {
        self.get(id).is_some_and(|instance| instance.active)
    }

    /// Template an instance belongs to.
    #[must_use]
    pub fn template_of(&self, id: InstanceId) -> Option<TemplateId> {
        self.get(id).map(|instance| instance.template)
    }

    /// Pool bookkeeping for a template.
    #[must_use]
    pub fn pool(&self, template: TemplateId) -> Option<&EntityPool> {
        self.pools.get(&template)
    }

    /// Free instances left for `template` (0 for unknown templates).
    #[must_use]
    pub fn free_count(&self, template: TemplateId) -> usize {
        self.pool(template).map_or(0, EntityPool::free_count)
    }

    /// Active instances of `template` (0 for unknown templates).
    #[must_use]
    pub fn active_count(&self, template: TemplateId) -> usize {
        self.pool(template).map_or(0, EntityPool::active_count)
    }

    /// Allocated capacity of `template` (0 for unknown templates).
    #[must_use]
    pub fn capacity(&self, template: TemplateId) -> usize {
        self.pool(template).map_or(0, EntityPool::capacity)
    }

    /// Whether at least one instance of `template` can be acquired.
    #[must_use]
    pub fn is_available(&self, template: TemplateId) -> bool {
        self.free_count(template) > 0
    }

    /// All active instance IDs in ascending order.
    #[must_use]
    pub fn active_ids(&self) -> Vec<InstanceId> {
        self.instances
            .iter()
            .filter(|instance| instance.active)
            .map(|instance| instance.id)
            .collect()
    }

    /// Total active instances across every template.
    #[must_use]
    pub fn total_active(&self) -> usize {
        self.pools.values().map(EntityPool::active_count).sum()
    }

    /// Iterate over every instance in arena order.
    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances.iter()
    }

    /// Iterate over pools in template order.
    pub fn pools(&self) -> impl Iterator<Item = (TemplateId, &EntityPool)> {
        self.pools.iter().map(|(&id, pool)| (id, pool))
    }
}
