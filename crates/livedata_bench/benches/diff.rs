//! Diff engine benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use livedata_bench::{generate_snapshot, mutate_snapshot};
use livedata_core::{apply_events, diff_snapshots};

/// Benchmark diffing snapshots of growing size with 10% churn.
fn bench_diff_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");

    for size in [100, 1_000, 10_000] {
        let old = generate_snapshot(size, 8);
        let new = mutate_snapshot(&old, 10);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("churn_10pct", size), &size, |b, _| {
            b.iter(|| black_box(diff_snapshots(black_box(&old), black_box(&new))));
        });
    }

    group.finish();
}

/// Benchmark the no-change case, which every idle poll hits.
fn bench_diff_unchanged(c: &mut Criterion) {
    let snapshot = generate_snapshot(1_000, 8);
    let copy = snapshot.clone();
    c.bench_function("diff/unchanged_1000", |b| {
        b.iter(|| black_box(diff_snapshots(black_box(&snapshot), black_box(&copy))));
    });
}

/// Benchmark applying events to a client-side cache.
fn bench_apply(c: &mut Criterion) {
    let old = generate_snapshot(1_000, 8);
    let new = mutate_snapshot(&old, 50);
    let events = diff_snapshots(&old, &new);
    c.bench_function("apply/churn_50pct_1000", |b| {
        b.iter(|| {
            let mut cache = old.clone();
            apply_events(&mut cache, black_box(&events));
            black_box(cache);
        });
    });
}

criterion_group!(benches, bench_diff_sizes, bench_diff_unchanged, bench_apply);
criterion_main!(benches);
