//! Manual profiling entry point: spawns entities under the `profiling`
//! feature's `tracing` instrumentation and writes a trace file, for
//! inspecting archetype-creation/entity-spawn timing outside of the
//! criterion benches in `benches/`, which measure throughput but don't
//! capture a trace.

use std::fs::File;
use std::time::Instant;

use archetype_ecs::World;

#[derive(Debug, Clone)]
struct Position(f32, f32, f32);

#[derive(Debug, Clone)]
struct Velocity(f32, f32, f32);

#[derive(Debug, Clone)]
struct Health(u32);

fn main() {
    let file = File::create("trace.json").expect("create trace.json");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .init();

    let mut world = World::new();

    for _ in 0..1000 {
        world.spawn_bundle((Position(1.0, 2.0, 3.0), Velocity(1.0, 0.0, 0.0))).unwrap();
    }

    let start = Instant::now();
    for _ in 0..10_000 {
        world
            .spawn_bundle((Position(1.0, 2.0, 3.0), Velocity(1.0, 0.0, 0.0), Health(100)))
            .unwrap();
    }
    println!("Spawn 10k entities: {:?}", start.elapsed());
}
