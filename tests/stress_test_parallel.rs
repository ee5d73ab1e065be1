use archetype_ecs::{Query, QueryMut, World};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug, Clone, Copy)]
struct Pos(f32, f32);
#[derive(Debug, Clone, Copy)]
struct Vel(f32, f32);
#[derive(Debug, Clone, Copy)]
struct Health(i32);

#[test]
#[cfg(feature = "parallel")]
fn parallel_write_over_ten_thousand_entities_touches_every_row() {
    let mut world = World::new();
    for _ in 0..10_000 {
        world.spawn_bundle((Pos(0.0, 0.0), Vel(1.0, 1.0), Health(100))).unwrap();
    }

    QueryMut::<&mut Vel>::new(&mut world).for_each_parallel(1, |vel| {
        vel.0 += 0.1;
    });

    let mut count = 0;
    Query::<&Vel>::new(&world).for_each(|vel| {
        assert!((vel.0 - 1.1).abs() < 1e-6);
        count += 1;
    });
    assert_eq!(count, 10_000);
}

#[test]
fn concurrent_spawn_and_read_never_observes_a_torn_count() {
    let world = Arc::new(Mutex::new(World::new()));
    let stop = Arc::new(AtomicUsize::new(0));

    thread::scope(|s| {
        let writer = Arc::clone(&world);
        let writer_stop = Arc::clone(&stop);
        s.spawn(move || {
            for _ in 0..1000 {
                writer.lock().unwrap().spawn_bundle((Pos(0.0, 0.0), Health(100))).unwrap();
                thread::yield_now();
            }
            writer_stop.store(1, Ordering::SeqCst);
        });

        for _ in 0..4 {
            let reader = Arc::clone(&world);
            let reader_stop = Arc::clone(&stop);
            s.spawn(move || {
                while reader_stop.load(Ordering::SeqCst) == 0 {
                    let guard = reader.lock().unwrap();
                    let count = Query::<&Pos>::new(&guard).count();
                    assert!(count <= 1000);
                    drop(guard);
                    thread::yield_now();
                }
            });
        }
    });

    let guard = world.lock().unwrap();
    assert_eq!(Query::<&Pos>::new(&guard).count(), 1000);
}

#[test]
fn repeated_component_migration_preserves_every_entitys_position() {
    let mut world = World::new();
    let entities: Vec<_> = (0..1000).map(|i| world.spawn_bundle((Pos(i as f32, 0.0),)).unwrap()).collect();

    for &entity in &entities {
        world.add_component(entity, Vel(1.0, 1.0)).unwrap();
        world.remove_component::<Vel>(entity).unwrap();
    }

    for (i, &entity) in entities.iter().enumerate() {
        assert_eq!(world.get_component::<Pos>(entity).unwrap().0, i as f32);
    }
}
