//! Frame executor: runs a [`Schedule`] phase by phase, invoking each
//! enabled system's `on_before_update` / `update` / `on_after_update` hook
//! sequence, then flushes the world's command buffers once per tick.

use rustc_hash::FxHashMap;
use std::collections::HashSet;

use crate::error::Result;
use crate::schedule::Schedule;
use crate::system::{BoxedSystem, Phase, SystemId};
use crate::World;

#[cfg(feature = "profiling")]
use tracing::{debug, trace};

/// Per-system timing summary collected by [`SystemProfiler`].
#[derive(Debug, Clone)]
pub struct SystemStats {
    pub min: std::time::Duration,
    pub max: std::time::Duration,
    pub avg: std::time::Duration,
    pub call_count: u64,
}

/// Per-system execution timing.
#[derive(Default)]
pub struct SystemProfiler {
    timings: FxHashMap<SystemId, Vec<std::time::Duration>>,
    call_counts: FxHashMap<SystemId, u64>,
}

impl SystemProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_execution(&mut self, id: SystemId, duration: std::time::Duration) {
        self.timings.entry(id).or_default().push(duration);
        *self.call_counts.entry(id).or_insert(0) += 1;
    }

    pub fn get_stats(&self, id: SystemId) -> Option<SystemStats> {
        let timings = self.timings.get(&id)?;
        if timings.is_empty() {
            return None;
        }
        let min = *timings.iter().min().unwrap();
        let max = *timings.iter().max().unwrap();
        let avg = timings.iter().sum::<std::time::Duration>() / timings.len() as u32;
        Some(SystemStats {
            min,
            max,
            avg,
            call_count: *self.call_counts.get(&id).unwrap_or(&0),
        })
    }

    pub fn clear(&mut self) {
        self.timings.clear();
        self.call_counts.clear();
    }
}

/// Drives a [`Schedule`] across ticks.
pub struct Executor {
    pub schedule: Schedule,
    pub profiler: SystemProfiler,
}

fn disjoint_refs<'a>(systems: &'a mut [BoxedSystem], ids: &[SystemId]) -> Vec<&'a mut BoxedSystem> {
    let wanted: HashSet<SystemId> = ids.iter().copied().collect();
    systems
        .iter_mut()
        .enumerate()
        .filter(|(i, _)| wanted.contains(&SystemId(*i as u32)))
        .map(|(_, s)| s)
        .collect()
}

fn run_one(system: &mut BoxedSystem, world: &World, dt: f32) -> Result<()> {
    #[cfg(feature = "profiling")]
    let start = std::time::Instant::now();
    system.on_before_update(world, dt)?;
    system.update(world, dt)?;
    system.on_after_update(world, dt)?;
    #[cfg(feature = "profiling")]
    trace!(system = system.name(), elapsed = ?start.elapsed(), "system ran");
    Ok(())
}

impl Executor {
    pub fn new(schedule: Schedule) -> Self {
        Self {
            schedule,
            profiler: SystemProfiler::new(),
        }
    }

    /// Run every phase, in phase order, once.
    pub fn execute_frame(&mut self, world: &mut World, dt: f32) -> Result<()> {
        self.schedule.ensure_built()?;
        for phase in Phase::ORDER {
            self.run_phase(phase, world, dt)?;
        }
        world.flush_commands()?;
        Ok(())
    }

    /// Run only `FixedUpdate`-phase systems.
    pub fn fixed_update(&mut self, world: &mut World, dt: f32) -> Result<()> {
        self.schedule.ensure_built()?;
        self.run_phase(Phase::FixedUpdate, world, dt)?;
        world.flush_commands()?;
        Ok(())
    }

    fn run_phase(&mut self, phase: Phase, world: &World, dt: f32) -> Result<()> {
        let order: Vec<SystemId> = self.schedule.phase_run_order(phase).to_vec();
        if order.is_empty() {
            return Ok(());
        }
        let enabled: HashSet<SystemId> = order
            .into_iter()
            .filter(|id| self.schedule.is_enabled(*id))
            .collect();

        #[cfg(feature = "profiling")]
        debug!(phase = phase.name(), systems = enabled.len(), "running phase");

        let stage_plan: Vec<(Phase, Vec<SystemId>)> = self
            .schedule
            .stage_plan()
            .iter()
            .map(|(p, s)| (*p, s.systems.clone()))
            .collect();

        for (phase_tag, stage_systems) in stage_plan {
            if phase_tag != phase {
                continue;
            }
            let ids: Vec<SystemId> = stage_systems
                .into_iter()
                .filter(|id| enabled.contains(id))
                .collect();
            if ids.is_empty() {
                continue;
            }

            let mut refs = disjoint_refs(&mut self.schedule.systems, &ids);

            #[cfg(feature = "parallel")]
            {
                use rayon::prelude::*;
                refs.par_iter_mut()
                    .try_for_each(|sys| run_one(sys, world, dt))?;
            }
            #[cfg(not(feature = "parallel"))]
            {
                for sys in refs.iter_mut() {
                    run_one(sys, world, dt)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as EcsResult;
    use crate::system::{System, SystemAccess};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSystem {
        name: &'static str,
        count: Arc<AtomicUsize>,
    }

    impl System for CountingSystem {
        fn access(&self) -> SystemAccess {
            SystemAccess::empty()
        }
        fn name(&self) -> &'static str {
            self.name
        }
        fn update(&mut self, _world: &World, _dt: f32) -> EcsResult<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    #[test]
    fn execute_frame_runs_every_enabled_system_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let schedule = Schedule::new().with_system(Box::new(CountingSystem {
            name: "counter",
            count: count.clone(),
        }));
        let mut executor = Executor::new(schedule);
        let mut world = World::new();
        executor.execute_frame(&mut world, 1.0 / 60.0).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disabled_system_is_skipped() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut schedule = Schedule::new();
        schedule.add_system(Box::new(CountingSystem {
            name: "counter",
            count: count.clone(),
        }));
        schedule.ensure_built().unwrap();
        let world = World::new();
        schedule.set_enabled("counter", false, &world);
        let mut executor = Executor::new(schedule);
        let mut world = world;
        executor.execute_frame(&mut world, 1.0 / 60.0).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
