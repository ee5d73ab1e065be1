//! Basic ECS usage: spawning, component access, queries, despawn.

use archetype_ecs::{Query, World};

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
struct Health(u32);

fn main() {
    let mut world = World::new();

    println!("Creating entities...");

    let entity1 = world
        .spawn_bundle((Position { x: 0.0, y: 0.0 }, Velocity { x: 1.0, y: 0.5 }))
        .expect("spawn entity1");
    println!("Spawned entity {entity1:?}");

    let entity2 = world
        .spawn_bundle((
            Position { x: 10.0, y: 20.0 },
            Velocity { x: -1.0, y: 2.0 },
            Health(100),
        ))
        .expect("spawn entity2");
    println!("Spawned entity {entity2:?}");

    let entity3 = world.spawn_bundle((Position { x: 5.0, y: 5.0 },)).expect("spawn entity3");
    println!("Spawned entity {entity3:?}");

    println!("\nPositions before despawn:");
    Query::<&Position>::new(&world).for_each(|pos| println!("  {pos:?}"));

    world.despawn(entity2).expect("despawn entity2");
    println!("\nDespawned entity {entity2:?}");
    assert!(!world.is_alive(entity2));

    println!("\nArchetype summary:");
    for (i, archetype) in world.archetypes().iter().enumerate() {
        println!("  archetype {i}: {} entities, {} component types", archetype.count(), archetype.component_infos().len());
    }
}
