#![allow(dead_code)]

use archetype_ecs::{Query, QueryMut, World};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

#[derive(Debug, Clone, Copy)]
struct Position(f32, f32, f32);

#[derive(Debug, Clone, Copy)]
struct Velocity(f32, f32, f32);

fn populated_world(count: usize) -> World {
    let mut world = World::new();
    for i in 0..count {
        world.spawn_bundle((Position(i as f32, 0.0, 0.0), Velocity(1.0, 0.0, 0.0))).unwrap();
    }
    world
}

fn bench_query_iteration(c: &mut Criterion) {
    let world = populated_world(10_000);
    c.bench_function("query_iter_10k", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            Query::<(&Position, &Velocity)>::new(&world).for_each(|(pos, vel)| {
                sum += pos.0 + vel.0;
            });
            black_box(sum);
        })
    });
}

fn bench_query_mut_iteration(c: &mut Criterion) {
    c.bench_function("query_mut_iter_10k", |b| {
        let mut world = populated_world(10_000);
        b.iter(|| {
            QueryMut::<&mut Position>::new(&mut world).for_each(|pos| {
                pos.0 += 1.0;
            });
        })
    });
}

fn bench_warm_cache_lookup(c: &mut Criterion) {
    let world = populated_world(10_000);
    Query::<(&Position, &Velocity)>::new(&world).count();
    c.bench_function("query_warm_cache_lookup", |b| {
        b.iter(|| {
            black_box(Query::<(&Position, &Velocity)>::new(&world).count());
        })
    });
}

criterion_group!(benches, bench_query_iteration, bench_query_mut_iteration, bench_warm_cache_lookup);
criterion_main!(benches);
