//! Uncontended cost of the hot path: `expect_progress_in` immediately
//! followed by an in-time `confirm_progress`, on a single registered
//! thread, measured per pair.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use progress_monitor::{CheckpointId, Location, Monitor};

fn bench_expect_confirm_pair(c: &mut Criterion) {
    let monitor: Monitor<4> = Monitor::new();
    monitor.register_thread();

    let mut group = c.benchmark_group("hot_path");
    group.bench_function("expect_confirm_in_time", |b| {
        b.iter(|| {
            monitor.expect_progress_in(
                black_box(1_000_000_000),
                black_box(CheckpointId(1)),
                black_box(Location::UNKNOWN),
            );
            monitor.confirm_progress(black_box(Location::UNKNOWN));
        });
    });
    group.finish();

    monitor.deregister_thread();
}

fn bench_nested_pairs(c: &mut Criterion) {
    let monitor: Monitor<4> = Monitor::new();
    monitor.register_thread();

    let mut group = c.benchmark_group("hot_path");
    group.bench_function("nested_depth_4", |b| {
        b.iter(|| {
            for depth in 0..4u64 {
                monitor.expect_progress_in(
                    black_box(1_000_000_000),
                    black_box(CheckpointId(depth + 1)),
                    black_box(Location::UNKNOWN),
                );
            }
            for _ in 0..4 {
                monitor.confirm_progress(black_box(Location::UNKNOWN));
            }
        });
    });
    group.finish();

    monitor.deregister_thread();
}

criterion_group!(benches, bench_expect_confirm_pair, bench_nested_pairs);
criterion_main!(benches);
