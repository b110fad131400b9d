//! Controller benchmarks for traffic_core.
//!
//! Run with: `cargo bench -p traffic_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use traffic_core::config::TrafficConfig;
use traffic_core::controller::TrafficController;
use traffic_test_utils::determinism::{deliver_arrivals, started_controller};
use traffic_test_utils::fixtures;

fn warmed(config: TrafficConfig) -> TrafficController {
    let mut controller = started_controller(config, 1);
    for _ in 0..200 {
        controller.tick(0.05);
        deliver_arrivals(&mut controller);
    }
    controller
}

/// Steady-state tick cost with arrivals delivered.
pub fn tick_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");
    for (name, config) in [
        ("single_group", TrafficConfig::default()),
        ("road_sections", fixtures::road_section_config()),
    ] {
        group.bench_function(name, |b| {
            b.iter_batched_ref(
                || warmed(config.clone()),
                |controller| {
                    for _ in 0..100 {
                        black_box(controller.tick(0.05));
                        deliver_arrivals(controller);
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

/// Round setup cost: validation, pool allocation and initial bans.
pub fn round_start_benchmark(c: &mut Criterion) {
    c.bench_function("start_round", |b| {
        b.iter(|| black_box(started_controller(fixtures::road_section_config(), 7)));
    });
}

criterion_group!(benches, tick_benchmark, round_start_benchmark);
criterion_main!(benches);
