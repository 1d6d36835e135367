//! Simulation benchmarks for otter_core.
//!
//! Run with: `cargo bench -p otter_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use otter_core::modifier::{Modifier, ModifierStack, Operation};
use otter_core::prelude::CommandId;
use otter_test_utils::fixtures::otter_world;

fn stack_of(size: usize) -> ModifierStack {
    let operations = [Operation::Add, Operation::Mul, Operation::Sub, Operation::Div];
    ModifierStack::from_entries((0..size).map(|i| {
        let operation = operations[i % operations.len()];
        let modifier = Modifier::new(format!("m{i}"), 1.0 + (i % 7) as f64 * 0.1, operation)
            .with_priority((i % 5) as f64);
        (format!("key_{i}"), modifier)
    }))
}

/// Folds of stacks at typical and large sizes.
pub fn fold_benchmark(c: &mut Criterion) {
    let small = stack_of(8);
    let large = stack_of(256);
    c.bench_function("stack_apply_8", |b| b.iter(|| black_box(small.apply(black_box(10.0)))));
    c.bench_function("stack_apply_256", |b| b.iter(|| black_box(large.apply(black_box(10.0)))));
}

/// One simulated minute of the otter game with a player fishing nonstop.
pub fn world_benchmark(c: &mut Criterion) {
    let fish = CommandId::from("find_fish_solo");
    c.bench_function("otter_world_one_minute", |b| {
        b.iter(|| {
            let mut world = otter_world();
            for _ in 0..600 {
                let _ = world.run_command(&fish);
                world.advance(0.1);
            }
            black_box(world.time_played())
        });
    });
}

criterion_group!(benches, fold_benchmark, world_benchmark);
criterion_main!(benches);
