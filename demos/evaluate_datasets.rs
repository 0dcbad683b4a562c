//! Evaluate Datasets: end-to-end evaluation run
//!
//! Registers two synthetic datasets (one two-file, one combined), runs three
//! detectors against them, and prints the results table. One detector always
//! fails to show that failures are recorded rather than aborting the run.
//!
//! Run with: cargo run --example evaluate_datasets
//! Verbose:  RUST_LOG=tsad_eval=debug cargo run --example evaluate_datasets

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tsad_eval::algorithm::{AlgorithmDescriptor, AlgorithmSet};
use tsad_eval::dataset::DatasetRegistry;
use tsad_eval::engine::{Engine, EngineConfig};
use tsad_eval::metrics::{FnMetric, MetricSet};
use tsad_eval::results::GroupBy;

/// Sine wave with spikes at every 97th step.
#[allow(clippy::cast_precision_loss)]
fn write_datasets(dir: &Path) -> std::io::Result<()> {
    let mut data = String::new();
    let mut labels = String::new();
    let mut combined = String::from("value,is_anomaly\n");
    for i in 0..500_usize {
        let spike = i % 97 == 0 && i > 0;
        let value = (i as f64 / 10.0).sin() + if spike { 6.0 } else { 0.0 };
        let _ = writeln!(data, "{value:.5}");
        if spike {
            let _ = writeln!(labels, "{i}");
        }
        let _ = writeln!(combined, "{:.5},{}", value * 2.0, u8::from(spike));
    }
    fs::write(dir.join("sine_data.csv"), data)?;
    fs::write(dir.join("sine_labels.csv"), labels)?;
    fs::write(dir.join("sine_combined.csv"), combined)?;
    fs::write(
        dir.join("datasets.json"),
        r#"{
            "sine": {"data": "sine_data.csv", "labels": "sine_labels.csv"},
            "sine_scaled": {"dataset": "sine_combined.csv"}
        }"#,
    )
}

/// Absolute deviation from the series mean.
#[allow(clippy::cast_precision_loss)]
fn deviating_from_mean(values: &[Vec<f64>]) -> anyhow::Result<Vec<f64>> {
    let mean = values.iter().map(|row| row[0]).sum::<f64>() / values.len() as f64;
    Ok(values.iter().map(|row| (row[0] - mean).abs()).collect())
}

/// Best F1 over thresholds taken from the scores themselves.
#[allow(clippy::cast_precision_loss)]
fn best_f1(labels: &[u8], scores: &[f64]) -> anyhow::Result<f64> {
    let positives = labels.iter().filter(|&&l| l == 1).count();
    anyhow::ensure!(positives > 0, "no anomalies in ground truth");

    let mut best = 0.0_f64;
    for &threshold in scores {
        let (mut tp, mut fp) = (0_usize, 0_usize);
        for (&label, &score) in labels.iter().zip(scores) {
            if score >= threshold {
                if label == 1 {
                    tp += 1;
                } else {
                    fp += 1;
                }
            }
        }
        let precision = tp as f64 / (tp + fp) as f64;
        let recall = tp as f64 / positives as f64;
        if precision + recall > 0.0 {
            best = best.max(2.0 * precision * recall / (precision + recall));
        }
    }
    Ok(best)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tsad_eval=info".into()),
        )
        .init();

    println!("=== tsad-eval: Evaluate Datasets ===\n");

    let workspace = tempfile::tempdir()?;
    write_datasets(workspace.path())?;

    let mut registry = DatasetRegistry::new(workspace.path());
    registry.register_file(workspace.path().join("datasets.json"))?;
    for id in registry.identifiers() {
        let summary = registry.load(id)?.summary();
        println!(
            "  {id:<12} length={} anomalies={} ({} points) contamination={:.3}",
            summary.length, summary.num_anomalies, summary.anomalous_points, summary.contamination
        );
    }

    let algorithms = AlgorithmSet::from_descriptors([
        AlgorithmDescriptor::from_array_fn("deviating_from_mean", deviating_from_mean)?,
        AlgorithmDescriptor::from_array_fn("zeros_like", |v| Ok(vec![0.0; v.len()]))?,
        AlgorithmDescriptor::from_array_fn("not_fitted", |_| {
            anyhow::bail!("model must be fitted before scoring")
        })?,
    ])?;

    let mut metrics = MetricSet::new();
    metrics.add(FnMetric::new("BEST_F1", best_f1))?;

    let config = EngineConfig::builder()
        .max_workers(2)
        .results_dir(workspace.path().join("results"))
        .persist_scores(true)
        .build()?;

    let engine = Engine::builder()
        .registry(registry)
        .algorithms(algorithms)
        .metrics(metrics)
        .config(config)
        .build()?;

    let summary = engine.run().await?;

    println!("\n=== Results ===");
    for row in engine.results().rows() {
        let score = row
            .metric("BEST_F1")
            .and_then(tsad_eval::MetricValue::score)
            .map_or_else(|| "-".to_string(), |s| format!("{s:.3}"));
        println!(
            "  {:<32} {:<16} f1={score:<6} {}",
            row.key().to_string(),
            row.status().as_str(),
            row.error().unwrap_or("")
        );
    }

    println!("\n=== By Algorithm ===");
    for (algorithm, rows) in engine.results().group_by(GroupBy::Algorithm) {
        let ok = rows.iter().filter(|r| r.error().is_none()).count();
        println!("  {algorithm:<20} {ok}/{} succeeded", rows.len());
    }

    println!(
        "\n{} trials: {} succeeded, {} algorithm errors, {} dataset errors",
        summary.trials, summary.succeeded, summary.algorithm_errors, summary.dataset_errors
    );
    if let Some(dir) = summary.run_dir {
        println!("Run directory: {}", dir.display());
    }

    Ok(())
}
