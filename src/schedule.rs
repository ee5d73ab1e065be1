//! Schedule builder: per-phase topological ordering plus conflict-based
//! parallel-stage grouping.
//!
//! Ordering comes from each system's declared `phase`/`order`/`runs_before`/
//! `runs_after` (via [`System::ordering`]) — never from component conflicts.
//! Conflicts are a separate, later pass that packs the already-ordered
//! systems of a phase into stages that may run in parallel.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;

use crate::error::{EcsError, Result};
use crate::system::{BoxedSystem, Phase, System, SystemAccess, SystemId};

#[cfg(feature = "profiling")]
use tracing::error;

/// A set of systems, in the same phase, that do not conflict with each
/// other and so may run concurrently.
#[derive(Debug, Clone, Default)]
pub struct Stage {
    pub systems: Vec<SystemId>,
}

impl Stage {
    fn new() -> Self {
        Self::default()
    }

    fn can_add(&self, access: &SystemAccess, systems: &[BoxedSystem]) -> bool {
        self.systems
            .iter()
            .all(|&id| !access.conflicts_with(&systems[id.0 as usize].access()))
    }
}

fn topo_sort_phase(systems: &[BoxedSystem], indices: &[usize], phase: Phase) -> Result<Vec<SystemId>> {
    let local_count = indices.len();
    let name_to_local: FxHashMap<&str, usize> = indices
        .iter()
        .enumerate()
        .map(|(local, &global)| (systems[global].name(), local))
        .collect();

    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); local_count];
    let mut in_degree = vec![0usize; local_count];

    for (local, &global) in indices.iter().enumerate() {
        let ordering = systems[global].ordering();
        for before_name in &ordering.runs_before {
            if let Some(&target) = name_to_local.get(before_name) {
                edges[local].push(target);
                in_degree[target] += 1;
            }
        }
        for after_name in &ordering.runs_after {
            if let Some(&source) = name_to_local.get(after_name) {
                edges[source].push(local);
                in_degree[local] += 1;
            }
        }
    }

    let order_of = |local: usize| systems[indices[local]].ordering().order;

    let mut ready: BinaryHeap<Reverse<(i32, usize)>> = BinaryHeap::new();
    for local in 0..local_count {
        if in_degree[local] == 0 {
            ready.push(Reverse((order_of(local), local)));
        }
    }

    let mut sorted_locals = Vec::with_capacity(local_count);
    while let Some(Reverse((_, local))) = ready.pop() {
        sorted_locals.push(local);
        for &next in &edges[local] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse((order_of(next), next)));
            }
        }
    }

    if sorted_locals.len() != local_count {
        #[cfg(feature = "profiling")]
        error!(phase = phase.name(), "CYCLE-DETECTED in system ordering graph");
        return Err(EcsError::CycleDetected { phase: phase.name() });
    }

    Ok(sorted_locals
        .into_iter()
        .map(|local| SystemId(indices[local] as u32))
        .collect())
}

/// Complete, phase-ordered execution schedule built from a fixed set of
/// systems.
pub struct Schedule {
    pub(crate) systems: Vec<BoxedSystem>,
    pub(crate) enabled: Vec<bool>,
    phase_order: Vec<(Phase, Vec<SystemId>)>,
    stages: Vec<(Phase, Stage)>,
    dirty: bool,
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

impl Schedule {
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
            enabled: Vec::new(),
            phase_order: Vec::new(),
            stages: Vec::new(),
            dirty: true,
        }
    }

    pub fn from_systems(systems: Vec<BoxedSystem>) -> Result<Self> {
        let mut schedule = Self::new();
        for system in systems {
            schedule.add_system(system);
        }
        schedule.ensure_built()?;
        Ok(schedule)
    }

    pub fn with_system(mut self, system: BoxedSystem) -> Self {
        self.add_system(system);
        self
    }

    pub fn add_system(&mut self, system: BoxedSystem) {
        self.systems.push(system);
        self.enabled.push(true);
        self.dirty = true;
    }

    pub fn get_system_mut(&mut self, name: &str) -> Option<&mut (dyn System + 'static)> {
        self.systems
            .iter_mut()
            .find(|sys| sys.name() == name)
            .map(|sys| sys.as_mut())
    }

    pub fn is_enabled(&self, id: SystemId) -> bool {
        self.enabled.get(id.0 as usize).copied().unwrap_or(false)
    }

    /// Toggle a system by name, firing `on_enabled`/`on_disabled` exactly
    /// once on an actual transition.
    pub fn set_enabled(&mut self, name: &str, enabled: bool, world: &crate::World) {
        if let Some(idx) = self.systems.iter().position(|s| s.name() == name) {
            if self.enabled[idx] == enabled {
                return;
            }
            self.enabled[idx] = enabled;
            if enabled {
                self.systems[idx].on_enabled(world);
            } else {
                self.systems[idx].on_disabled(world);
            }
        }
    }

    pub fn build(mut self) -> Result<Self> {
        self.ensure_built()?;
        Ok(self)
    }

    pub(crate) fn ensure_built(&mut self) -> Result<()> {
        if self.dirty {
            self.rebuild()?;
        }
        Ok(())
    }

    fn rebuild(&mut self) -> Result<()> {
        let mut phase_order = Vec::new();
        let mut stages = Vec::new();

        for phase in Phase::ORDER {
            let indices: Vec<usize> = self
                .systems
                .iter()
                .enumerate()
                .filter(|(_, s)| s.phase() == phase)
                .map(|(i, _)| i)
                .collect();
            if indices.is_empty() {
                continue;
            }

            let sorted = topo_sort_phase(&self.systems, &indices, phase)?;

            let mut current = Stage::new();
            for &id in &sorted {
                let access = self.systems[id.0 as usize].access();
                if !current.can_add(&access, &self.systems) && !current.systems.is_empty() {
                    stages.push((phase, std::mem::take(&mut current)));
                }
                current.systems.push(id);
            }
            if !current.systems.is_empty() {
                stages.push((phase, current));
            }

            phase_order.push((phase, sorted));
        }

        self.phase_order = phase_order;
        self.stages = stages;
        self.dirty = false;
        Ok(())
    }

    /// The run order for one phase, ignoring conflicts: exactly the order
    /// `update`/`fixed_update` invoke that phase's systems in.
    pub(crate) fn phase_run_order(&self, phase: Phase) -> &[SystemId] {
        self.phase_order
            .iter()
            .find(|(p, _)| *p == phase)
            .map(|(_, ids)| ids.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn stage_plan(&self) -> &[(Phase, Stage)] {
        &self.stages
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    pub(crate) fn system_mut_by_id(&mut self, id: SystemId) -> Option<&mut BoxedSystem> {
        self.systems.get_mut(id.0 as usize)
    }

    pub fn get_accesses(&self) -> Vec<SystemAccess> {
        self.systems.iter().map(|s| s.access()).collect()
    }

    /// Look up a system by its concrete type, returning the first match in
    /// insertion order.
    pub fn get_system<T: System>(&self) -> Option<&T> {
        self.systems.iter().find_map(|s| s.as_any().downcast_ref::<T>())
    }

    /// Enable the first system whose concrete type matches `T`, firing
    /// `on_enabled` on an actual transition. Returns whether a matching
    /// system was found.
    pub fn enable_system<T: System>(&mut self, world: &crate::World) -> bool {
        self.set_enabled_typed::<T>(true, world)
    }

    /// Disable the first system whose concrete type matches `T`, firing
    /// `on_disabled` on an actual transition. Returns whether a matching
    /// system was found.
    pub fn disable_system<T: System>(&mut self, world: &crate::World) -> bool {
        self.set_enabled_typed::<T>(false, world)
    }

    fn set_enabled_typed<T: System>(&mut self, enabled: bool, world: &crate::World) -> bool {
        let Some(idx) = self.systems.iter().position(|s| s.as_any().is::<T>()) else {
            return false;
        };
        if self.enabled[idx] != enabled {
            self.enabled[idx] = enabled;
            if enabled {
                self.systems[idx].on_enabled(world);
            } else {
                self.systems[idx].on_disabled(world);
            }
        }
        true
    }
}
