//! Typed, slot-partitioned resource inventory.
//!
//! Unlike a deep-copy-and-restore snapshot, `checkout` records a journal of
//! `(type, id, delta)` entries as it deducts slots. If any group in the
//! request cannot be satisfied, the journal is replayed in reverse with the
//! sign flipped, restoring the pool to its pre-call state without ever
//! copying the whole inventory.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::config::PoolSpec;
use crate::core::error::PoolError;
use crate::core::resource::{
    AcquiredGroup, AcquiredResources, ResourceInstance, ResourceNeed, ResourceRequest,
};

/// A single `(type, id, delta)` journal entry. `delta` is the amount
/// deducted from the instance's `slots` field; replaying it in reverse adds
/// `delta` back.
struct JournalEntry {
    kind: String,
    id: String,
    delta: u32,
}

struct PoolState {
    instances: HashMap<String, Vec<ResourceInstance>>,
}

/// A typed, slot-partitioned resource pool.
///
/// `types()` always reports `cpus` and `gpus` even if no instances of those
/// types were configured, matching the convention that every job's
/// `required_resources()` may reference them.
pub struct ResourcePool {
    state: Mutex<PoolState>,
    /// Total slots configured per type at construction time; `accommodates`
    /// checks against this, not current availability.
    total_capacity: HashMap<String, u32>,
}

impl ResourcePool {
    /// Build a pool from an explicit type -> instances mapping.
    pub fn new(resources: HashMap<String, Vec<ResourceInstance>>) -> Self {
        let mut total_capacity = HashMap::new();
        for (kind, instances) in &resources {
            let total: u32 = instances.iter().map(|i| i.slots).sum();
            total_capacity.insert(kind.clone(), total);
        }
        Self {
            state: Mutex::new(PoolState { instances: resources }),
            total_capacity,
        }
    }

    /// Build a pool from a parsed resource-pool spec file (see
    /// [`crate::config::PoolSpec`]), recording each type's total capacity at
    /// construction time the same way [`Self::new`] does.
    pub fn from_spec(spec: PoolSpec) -> Self {
        Self::new(spec.resources)
    }

    /// Build a pool of single-slot instances from `type -> count` pairs. If
    /// `cpus` is absent, it defaults to the host's logical CPU count.
    pub fn uniform(counts: impl IntoIterator<Item = (String, u32)>) -> Self {
        let mut resources: HashMap<String, Vec<ResourceInstance>> = counts
            .into_iter()
            .map(|(kind, count)| {
                let instances = (0..count)
                    .map(|i| ResourceInstance { id: i.to_string(), slots: 1 })
                    .collect();
                (kind, instances)
            })
            .collect();
        resources.entry("cpus".to_string()).or_insert_with(|| {
            (0..num_cpus::get() as u32)
                .map(|i| ResourceInstance { id: i.to_string(), slots: 1 })
                .collect()
        });
        Self::new(resources)
    }

    /// Multiply every instance's `slots` of `kind` by `factor`, in place.
    /// Intended to be applied once, right after construction.
    pub fn oversubscribe(&mut self, kind: &str, factor: u32) {
        let state = self.state.get_mut();
        if let Some(instances) = state.instances.get_mut(kind) {
            for instance in instances.iter_mut() {
                instance.slots *= factor;
            }
            let total: u32 = instances.iter().map(|i| i.slots).sum();
            self.total_capacity.insert(kind.to_string(), total);
        }
    }

    /// Sorted list of known resource types, always including `cpus`/`gpus`.
    pub fn types(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut types: std::collections::BTreeSet<String> = state.instances.keys().cloned().collect();
        types.insert("cpus".to_string());
        types.insert("gpus".to_string());
        types.into_iter().collect()
    }

    /// Number of instances of `kind`. `node`/`nodes` is an aggregate and
    /// always reports `1`. Unknown types report `0`.
    pub fn count(&self, kind: &str) -> u32 {
        if kind == "node" || kind == "nodes" {
            return 1;
        }
        let state = self.state.lock();
        state.instances.get(kind).map_or(0, Vec::len) as u32
    }

    /// Check whether the pool could ever satisfy `request`, without mutating
    /// anything. Returns `Ok(())` or an explanatory [`PoolError`].
    pub fn accommodates(&self, request: &ResourceRequest) -> Result<(), PoolError> {
        if self.total_capacity.is_empty() {
            return Err(PoolError::EmptyResourcePool);
        }
        let needed = crate::core::resource::slots_needed_by_type(request);
        for kind in needed.keys() {
            if !self.total_capacity.contains_key(kind) {
                return Err(PoolError::Unavailable(kind.clone()));
            }
        }
        for (kind, slots) in &needed {
            let total = self.total_capacity.get(kind).copied().unwrap_or(0);
            if *slots > total {
                return Err(PoolError::InsufficientSlots(kind.clone()));
            }
        }
        Ok(())
    }

    /// Attempt to reserve every group of `request`. On success, returns the
    /// acquired resources in request order. On failure, the pool is restored
    /// to its pre-call state and [`PoolError::ResourceUnavailable`] is
    /// returned.
    pub fn checkout(&self, request: &ResourceRequest) -> Result<AcquiredResources, PoolError> {
        let mut state = self.state.lock();
        let mut journal: Vec<JournalEntry> = Vec::new();
        let mut acquired: AcquiredResources = Vec::with_capacity(request.len());

        for group in request {
            let mut acquired_group: AcquiredGroup = AcquiredGroup::new();
            for need in group {
                match Self::take_best_fit(&mut state, need) {
                    Some((id, slots)) => {
                        journal.push(JournalEntry { kind: need.kind.clone(), id: id.clone(), delta: slots });
                        acquired_group
                            .entry(need.kind.clone())
                            .or_default()
                            .push(ResourceInstance { id, slots });
                    }
                    None => {
                        Self::rollback(&mut state, &journal);
                        return Err(PoolError::ResourceUnavailable);
                    }
                }
            }
            acquired.push(acquired_group);
        }
        Ok(acquired)
    }

    /// Return previously acquired resources to the pool.
    pub fn checkin(&self, acquired: &AcquiredResources) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        for group in acquired {
            for (kind, instances) in group {
                for instance in instances {
                    Self::give_back(&mut state, kind, &instance.id, instance.slots)?;
                }
            }
        }
        Ok(())
    }

    /// Best-fit selection: the instance of `need.kind` with the smallest
    /// `slots` field that still covers the request, minimizing
    /// fragmentation. Deducts in place and returns `(id, slots_taken)`.
    fn take_best_fit(state: &mut PoolState, need: &ResourceNeed) -> Option<(String, u32)> {
        let instances = state.instances.get_mut(&need.kind)?;
        let best = instances
            .iter_mut()
            .filter(|inst| inst.slots >= need.slots)
            .min_by_key(|inst| inst.slots)?;
        best.slots -= need.slots;
        Some((best.id.clone(), need.slots))
    }

    fn give_back(state: &mut PoolState, kind: &str, id: &str, slots: u32) -> Result<(), PoolError> {
        let instances = state
            .instances
            .get_mut(kind)
            .ok_or_else(|| PoolError::UnknownResourceId(id.to_string(), kind.to_string()))?;
        let instance = instances
            .iter_mut()
            .find(|inst| inst.id == id)
            .ok_or_else(|| PoolError::UnknownResourceId(id.to_string(), kind.to_string()))?;
        instance.slots += slots;
        Ok(())
    }

    fn rollback(state: &mut PoolState, journal: &[JournalEntry]) {
        for entry in journal.iter().rev() {
            if let Some(instances) = state.instances.get_mut(&entry.kind) {
                if let Some(instance) = instances.iter_mut().find(|inst| inst.id == entry.id) {
                    instance.slots += entry.delta;
                }
            }
        }
    }
}
