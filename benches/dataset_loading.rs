//! Dataset loading benchmarks
//!
//! Benchmarks for the registry load path:
//! - Combined-file parsing
//! - Two-file parsing with sparse label expansion
//! - Score preparation
//!
//! Measure before optimizing.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;
use tsad_eval::dataset::{DatasetEntry, DatasetRegistry};
use tsad_eval::metrics::prepare_scores;

/// Write a combined file with `rows` rows of `width` values plus a label.
fn create_combined(path: &Path, rows: usize, width: usize) {
    let mut rng = rand::thread_rng();
    let mut out = String::with_capacity(rows * (width + 1) * 12);
    for _ in 0..rows {
        for _ in 0..width {
            let _ = write!(out, "{:.4},", rng.gen_range(-100.0..100.0));
        }
        let label = u8::from(rng.gen_bool(0.02));
        let _ = writeln!(out, "{label}");
    }
    fs::write(path, out).unwrap();
}

/// Write a data file and a sparse label file with ~2% anomalies.
fn create_two_file(dir: &Path, rows: usize) {
    let mut rng = rand::thread_rng();
    let mut data = String::with_capacity(rows * 12);
    let mut labels = String::new();
    for idx in 0..rows {
        let _ = writeln!(data, "{:.4}", rng.gen_range(0.0..10_000.0));
        if rng.gen_bool(0.02) {
            let _ = writeln!(labels, "{idx}");
        }
    }
    fs::write(dir.join("data.csv"), data).unwrap();
    fs::write(dir.join("labels.csv"), labels).unwrap();
}

fn bench_combined_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("combined_load");

    for rows in [1_000, 10_000, 100_000] {
        let dir = tempfile::tempdir().unwrap();
        create_combined(&dir.path().join("d.csv"), rows, 4);
        let mut registry = DatasetRegistry::new(dir.path());
        registry.register_entry(DatasetEntry::combined("d", "d.csv")).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, _| {
            b.iter(|| black_box(registry.load("d").unwrap()));
        });
    }

    group.finish();
}

fn bench_sparse_two_file_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("sparse_two_file_load");

    for rows in [1_000, 10_000, 100_000] {
        let dir = tempfile::tempdir().unwrap();
        create_two_file(dir.path(), rows);
        let mut registry = DatasetRegistry::new(dir.path());
        registry
            .register_entry(DatasetEntry::two_file("d", "data.csv", "labels.csv"))
            .unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, _| {
            b.iter(|| black_box(registry.load("d").unwrap()));
        });
    }

    group.finish();
}

fn bench_prepare_scores(c: &mut Criterion) {
    let mut rng = rand::thread_rng();
    let scores: Vec<f64> = (0..100_000).map(|_| rng.gen_range(-5.0..5.0)).collect();

    c.bench_function("prepare_scores_100k", |b| {
        b.iter(|| black_box(prepare_scores(scores.clone(), true)));
    });
}

criterion_group!(
    benches,
    bench_combined_load,
    bench_sparse_two_file_load,
    bench_prepare_scores
);
criterion_main!(benches);
