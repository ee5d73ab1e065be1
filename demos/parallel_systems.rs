//! Scheduling several systems across phases and running them with `Executor`.

use archetype_ecs::{Executor, Query, Result, Schedule, System, SystemAccess, World};

#[derive(Debug, Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy)]
struct Velocity {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy)]
struct Health {
    current: i32,
    max: i32,
}

struct MovementSystem;

impl System for MovementSystem {
    fn access(&self) -> SystemAccess {
        SystemAccess::empty()
    }

    fn name(&self) -> &'static str {
        "movement_system"
    }

    fn update(&mut self, world: &World, _dt: f32) -> Result<()> {
        let count = Query::<(&Position, &Velocity)>::new(world).count();
        println!("movement_system: {count} entities with position and velocity");
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

struct HealthSystem;

impl System for HealthSystem {
    fn access(&self) -> SystemAccess {
        SystemAccess::empty()
    }

    fn name(&self) -> &'static str {
        "health_system"
    }

    fn update(&mut self, world: &World, _dt: f32) -> Result<()> {
        Query::<&Health>::new(world).for_each(|health| {
            println!("health_system: {}/{}", health.current, health.max);
        });
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

struct RenderSystem;

impl System for RenderSystem {
    fn access(&self) -> SystemAccess {
        SystemAccess::empty()
    }

    fn name(&self) -> &'static str {
        "render_system"
    }

    fn update(&mut self, _world: &World, _dt: f32) -> Result<()> {
        println!("render_system: frame rendered");
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

fn main() -> Result<()> {
    println!("=== Parallel scheduler demo ===\n");

    let mut world = World::new();

    let entity1 = world.spawn_bundle((
        Position { x: 0.0, y: 0.0 },
        Velocity { x: 1.0, y: 0.5 },
        Health { current: 100, max: 100 },
    ))?;

    let entity2 = world.spawn_bundle((
        Position { x: 10.0, y: 5.0 },
        Velocity { x: -0.5, y: 1.0 },
        Health { current: 75, max: 100 },
    ))?;

    println!("Spawned entities: {entity1:?}, {entity2:?}\n");

    let schedule = Schedule::new()
        .with_system(Box::new(MovementSystem))
        .with_system(Box::new(HealthSystem))
        .with_system(Box::new(RenderSystem));

    let mut executor = Executor::new(schedule);

    for frame in 0..3 {
        println!("Frame {frame}");
        executor.execute_frame(&mut world, 1.0 / 60.0)?;
        println!();
    }

    println!("=== Demo complete ===");
    Ok(())
}
