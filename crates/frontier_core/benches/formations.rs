//! Formation planning benchmarks for frontier_core.
//!
//! Run with: `cargo bench -p frontier_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use frontier_core::components::EntityPositions;
use frontier_core::math::Fixed;
use frontier_core::movement::{MovementSource, TargetData};
use frontier_core::territory::ResourceEntity;
use frontier_test_utils::fixtures::{agent_row, border_world, open_manager, point};

/// Group planning for growing group sizes, in both formation shapes.
pub fn group_planning_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_group");
    for formation in ["circle", "line"] {
        for size in [4u32, 16, 48] {
            group.bench_with_input(BenchmarkId::new(formation, size), &size, |b, &size| {
                b.iter(|| {
                    let mut manager = open_manager();
                    let mut agents = agent_row(1, size, "infantry", -30, formation);
                    let plan = manager.plan_group(
                        &mut agents,
                        TargetData::at(point(0, 0)),
                        Fixed::ZERO,
                        &MovementSource::player_command(),
                        &EntityPositions::new(),
                    );
                    black_box(plan.assigned.len())
                });
            });
        }
    }
    group.finish();
}

/// Resources spawning into an active border.
pub fn resource_spawn_benchmark(c: &mut Criterion) {
    c.bench_function("spawn_resources_into_border", |b| {
        b.iter(|| {
            let (mut world, _) = border_world(&[(1, 0, point(0, 0), 12)]);
            for i in 0..64 {
                let x = (i % 8) * 3 - 12;
                let z = (i / 8) * 3 - 12;
                let _ = world.spawn_resource(ResourceEntity::new(
                    100 + u64::try_from(i).unwrap_or(0),
                    "ore",
                    point(x, z),
                ));
            }
            black_box(world.state_hash())
        });
    });
}

criterion_group!(benches, group_planning_benchmark, resource_spawn_benchmark);
criterion_main!(benches);
