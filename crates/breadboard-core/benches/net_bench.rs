//! Criterion benchmarks for net building and the tick pipeline.
//!
//! - `build_nets`: union-find over boards of 300, 3000 and 30000 pins' worth
//!   of parts.
//! - `tick`: full engine step on a large board, once with the net cache warm
//!   and once with a structural edit forcing a rebuild every tick.

use breadboard_core::command_queue::Command;
use breadboard_core::engine::Engine;
use breadboard_core::library;
use breadboard_core::net::build_nets;
use breadboard_core::test_utils::*;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

fn bench_build_nets(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_nets");
    for n in [50, 500, 5000] {
        let (parts, wires) = large_board(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| build_nets(&parts, &wires));
        });
    }
    group.finish();
}

fn bench_tick(c: &mut Criterion) {
    let (parts, wires) = large_board(1000);
    let mut cached = Engine::new(state_of(1, parts.clone(), wires.clone()));
    cached.step();

    let mut group = c.benchmark_group("tick");
    group.bench_function("cached_nets", |b| {
        b.iter(|| cached.step());
    });

    let mut churn = Engine::new(state_of(1, parts, wires));
    group.bench_function("rebuild_every_tick", |b| {
        b.iter(|| {
            let j = library::junction(origin());
            let id = j.id.clone();
            churn.submit(Command::AddComponent { component: j });
            churn.submit(Command::RemoveComponent { id });
            churn.step()
        });
    });
    group.finish();
}

criterion_group!(benches, bench_build_nets, bench_tick);
criterion_main!(benches);
