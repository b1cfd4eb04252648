//! Differ benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use snapledger_bench::{bench_schema, instance, run_at, shuffled};
use snapledger_core::diff;
use snapledger_storage::{CurrentRecord, FieldValue};

/// Benchmark diffing a first observation.
fn bench_diff_new(c: &mut Criterion) {
    let schema = bench_schema();
    let snapshot = instance(1, run_at(0), "RUNNING", 8);

    c.bench_function("diff/new", |b| {
        b.iter(|| black_box(diff(&schema, None, black_box(&snapshot))));
    });
}

/// Benchmark diffing unchanged snapshots whose labels arrive reordered.
fn bench_diff_unchanged(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_unchanged");
    let schema = bench_schema();

    for labels in [0, 8, 64, 512].iter() {
        group.throughput(Throughput::Elements(*labels as u64));
        group.bench_with_input(BenchmarkId::from_parameter(labels), labels, |b, &labels| {
            let old = instance(1, run_at(0), "RUNNING", labels);
            let current = CurrentRecord::from_snapshot(&old);
            let mut new = old.clone();
            new.collected_at = run_at(1);
            if let Some(children) = old.children.get("labels") {
                new.children.insert("labels".to_string(), shuffled(children));
            }

            b.iter(|| {
                let result = diff(&schema, Some(&current), black_box(&new));
                assert!(result.is_unchanged());
                black_box(result);
            });
        });
    }
    group.finish();
}

/// Benchmark diffing a snapshot with one changed field.
fn bench_diff_changed(c: &mut Criterion) {
    let schema = bench_schema();
    let old = instance(1, run_at(0), "RUNNING", 64);
    let current = CurrentRecord::from_snapshot(&old);
    let mut new = old.clone();
    new.fields
        .insert("status".to_string(), FieldValue::from("STOPPED"));

    c.bench_function("diff/changed", |b| {
        b.iter(|| black_box(diff(&schema, Some(&current), black_box(&new))));
    });
}

criterion_group!(
    benches,
    bench_diff_new,
    bench_diff_unchanged,
    bench_diff_changed
);
criterion_main!(benches);
