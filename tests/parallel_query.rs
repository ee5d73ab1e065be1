use archetype_ecs::{Query, QueryMut, World};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity {
    x: f32,
    y: f32,
}

#[test]
#[cfg(feature = "parallel")]
fn parallel_mutation_updates_every_matched_entity() {
    let mut world = World::new();

    for i in 0..5000 {
        world.spawn_bundle((Position { x: i as f32, y: 0.0 }, Velocity { x: 1.0, y: 1.0 })).unwrap();
    }
    for i in 0..5000 {
        world.spawn_bundle((Position { x: i as f32, y: 100.0 }, Velocity { x: 2.0, y: 2.0 })).unwrap();
    }

    QueryMut::<(&mut Position, &Velocity)>::new(&mut world).for_each_parallel(1, |(pos, vel)| {
        pos.x += vel.x;
        pos.y += vel.y;
    });

    let mut count = 0;
    Query::<(&Position, &Velocity)>::new(&world).for_each(|(pos, _vel)| {
        if pos.y < 50.0 {
            assert_eq!(pos.y, 1.0);
        } else {
            assert_eq!(pos.y, 102.0);
        }
        count += 1;
    });
    assert_eq!(count, 10000);
}

#[test]
#[cfg(feature = "parallel")]
fn parallel_mutation_below_the_threshold_falls_back_to_sequential() {
    let mut world = World::new();
    for i in 0..10 {
        world.spawn_bundle((Position { x: i as f32, y: 0.0 }, Velocity { x: 1.0, y: 0.0 })).unwrap();
    }

    QueryMut::<(&mut Position, &Velocity)>::new(&mut world).for_each_parallel(10_000, |(pos, vel)| {
        pos.x += vel.x;
    });

    assert_eq!(Query::<&Position>::new(&world).count(), 10);
}
