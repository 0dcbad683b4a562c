//! Integration tests for the execution engine
//!
//! Every declared trial must produce exactly one row, whatever the
//! algorithm or the dataset does.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tsad_eval::algorithm::{AlgorithmDescriptor, AlgorithmSet};
use tsad_eval::dataset::DatasetRegistry;
use tsad_eval::engine::{Engine, EngineConfig};
use tsad_eval::metrics::{FnMetric, MetricSet, MetricValue};
use tsad_eval::results::{
    TrialKey, TrialStatus, ANOMALY_SCORES_TS, EXECUTION_LOG, METRICS_CSV, RESULTS_JSON,
    RESULTS_PARQUET,
};

/// Three small datasets: d1 (one anomaly), quiet (no anomalies), and a
/// registered entry whose file does not exist.
fn fixture() -> (TempDir, DatasetRegistry) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("d1.csv"), "12751.0,1\n8767.0,0\n7005.0,0\n5257.0,0\n4189.0,0\n")
        .unwrap();
    fs::write(dir.path().join("quiet.csv"), "1.0,0\n1.5,0\n1.2,0\n").unwrap();

    let mut registry = DatasetRegistry::new(dir.path());
    registry
        .register_str(
            r#"{
                "d1": {"dataset": "d1.csv"},
                "quiet": {"dataset": "quiet.csv"},
                "missing": {"dataset": "missing.csv"}
            }"#,
        )
        .unwrap();
    (dir, registry)
}

fn zeros_like() -> AlgorithmDescriptor {
    AlgorithmDescriptor::from_array_fn("zeros_like", |v| Ok(vec![0.0; v.len()])).unwrap()
}

fn identity() -> AlgorithmDescriptor {
    AlgorithmDescriptor::from_array_fn("identity", |v| Ok(v.iter().map(|r| r[0]).collect()))
        .unwrap()
}

fn failing() -> AlgorithmDescriptor {
    AlgorithmDescriptor::from_array_fn("failing", |_| anyhow::bail!("model did not converge"))
        .unwrap()
}

/// Fraction of time steps where the rounded score equals the label.
fn accuracy() -> MetricSet {
    let mut metrics = MetricSet::new();
    metrics
        .add(FnMetric::new("ACCURACY", |labels: &[u8], scores: &[f64]| {
            let hits = labels
                .iter()
                .zip(scores)
                .filter(|&(&l, &s)| f64::from(l) == s.round())
                .count();
            #[allow(clippy::cast_precision_loss)]
            Ok(hits as f64 / labels.len() as f64)
        }))
        .unwrap();
    metrics
}

/// Number of callables running right now, and the most seen at once.
#[derive(Debug, Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An all-zeros detector that sleeps for `busy` while counted by `gauge`.
fn tracked(name: &str, busy: Duration, gauge: &Arc<Gauge>) -> AlgorithmDescriptor {
    let gauge = Arc::clone(gauge);
    AlgorithmDescriptor::from_array_fn(name, move |v| {
        gauge.enter();
        std::thread::sleep(busy);
        gauge.exit();
        Ok(vec![0.0; v.len()])
    })
    .unwrap()
}

// ============================================================================
// Trial Isolation
// ============================================================================

#[tokio::test]
async fn test_every_trial_gets_a_row() {
    let (_dir, registry) = fixture();
    let algorithms = AlgorithmSet::from_descriptors([zeros_like(), failing(), identity()]).unwrap();
    let engine = Engine::builder()
        .registry(registry)
        .algorithms(algorithms)
        .metrics(accuracy())
        .build()
        .unwrap();

    let summary = engine.run().await.unwrap();

    assert_eq!(summary.trials, 9);
    assert_eq!(engine.results().len(), 9);
    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.algorithm_errors, 2);
    assert_eq!(summary.dataset_errors, 3);
    assert!(summary.run_dir.is_none());
}

#[tokio::test]
async fn test_rows_follow_dataset_major_order() {
    let (_dir, registry) = fixture();
    let algorithms = AlgorithmSet::from_descriptors([zeros_like(), failing()]).unwrap();
    let engine = Engine::builder()
        .registry(registry)
        .datasets(["quiet", "d1"])
        .algorithms(algorithms)
        .build()
        .unwrap();
    engine.run().await.unwrap();

    let keys: Vec<String> = engine.results().rows().iter().map(|r| r.key().to_string()).collect();
    assert_eq!(
        keys,
        vec!["zeros_like/quiet", "failing/quiet", "zeros_like/d1", "failing/d1"]
    );
}

#[tokio::test]
async fn test_failing_algorithm_does_not_block_later_trials() {
    let (_dir, registry) = fixture();
    let algorithms = AlgorithmSet::from_descriptors([failing(), zeros_like()]).unwrap();
    let engine = Engine::builder()
        .registry(registry)
        .datasets(["d1"])
        .algorithms(algorithms)
        .build()
        .unwrap();
    engine.run().await.unwrap();

    let failed = engine.results().get(&TrialKey::new("d1", "failing")).unwrap();
    assert_eq!(failed.status(), TrialStatus::AlgorithmError);
    assert!(failed.error().unwrap().contains("model did not converge"));
    assert!(failed.metrics().is_empty());

    let ok = engine.results().get(&TrialKey::new("d1", "zeros_like")).unwrap();
    assert_eq!(ok.status(), TrialStatus::Success);
}

#[tokio::test]
async fn test_unknown_and_missing_datasets_are_dataset_errors() {
    let (_dir, registry) = fixture();
    let engine = Engine::builder()
        .registry(registry)
        .datasets(["missing", "never_registered"])
        .algorithms(AlgorithmSet::from_descriptors([zeros_like()]).unwrap())
        .build()
        .unwrap();
    let summary = engine.run().await.unwrap();

    assert_eq!(summary.dataset_errors, 2);
    for row in engine.results().rows() {
        assert_eq!(row.status(), TrialStatus::DatasetError);
        assert_eq!(row.duration(), Duration::ZERO);
        assert!(row.error().is_some());
    }
    let unknown = engine.results().get(&TrialKey::new("never_registered", "zeros_like")).unwrap();
    assert!(unknown.error().unwrap().contains("never_registered"));
}

#[tokio::test]
async fn test_zeros_like_on_quiet_dataset_is_success() {
    let (_dir, registry) = fixture();
    let engine = Engine::builder()
        .registry(registry)
        .datasets(["quiet"])
        .algorithms(AlgorithmSet::from_descriptors([zeros_like()]).unwrap())
        .metrics(accuracy())
        .build()
        .unwrap();
    engine.run().await.unwrap();

    let row = engine.results().get(&TrialKey::new("quiet", "zeros_like")).unwrap();
    assert_eq!(row.status(), TrialStatus::Success);
    assert_eq!(row.metric("ACCURACY"), Some(&MetricValue::Score(1.0)));
}

#[tokio::test]
async fn test_prediction_length_mismatch_only_degrades_metrics() {
    let (_dir, registry) = fixture();
    let short = AlgorithmDescriptor::from_array_fn("short", |_| Ok(vec![0.0])).unwrap();
    let engine = Engine::builder()
        .registry(registry)
        .datasets(["d1"])
        .algorithms(AlgorithmSet::from_descriptors([short]).unwrap())
        .metrics(accuracy())
        .build()
        .unwrap();
    engine.run().await.unwrap();

    let row = engine.results().get(&TrialKey::new("d1", "short")).unwrap();
    assert_eq!(row.status(), TrialStatus::Success);
    let metric = row.metric("ACCURACY").unwrap();
    assert!(!metric.is_available());
    assert!(matches!(metric, MetricValue::Unavailable(reason) if reason.contains("length")));
}

#[tokio::test]
async fn test_normalization_toggle() {
    let (_dir, registry) = fixture();
    let mut metrics = MetricSet::new();
    metrics
        .add(FnMetric::new("MAX", |_: &[u8], s: &[f64]| {
            Ok(s.iter().copied().fold(f64::MIN, f64::max))
        }))
        .unwrap();

    let engine = Engine::builder()
        .registry(registry)
        .datasets(["d1"])
        .algorithms(AlgorithmSet::from_descriptors([identity()]).unwrap())
        .metrics(metrics)
        .config(EngineConfig::builder().normalize_scores(false).build().unwrap())
        .build()
        .unwrap();

    let row = engine.run_trial("d1", "identity").await.unwrap();
    assert_eq!(row.metric("MAX"), Some(&MetricValue::Score(12751.0)));
}

// ============================================================================
// Timeouts and Concurrency
// ============================================================================

#[tokio::test]
async fn test_timeout_is_algorithm_error() {
    let (_dir, registry) = fixture();
    let slow = AlgorithmDescriptor::from_array_fn("slow", |v| {
        std::thread::sleep(Duration::from_millis(500));
        Ok(vec![0.0; v.len()])
    })
    .unwrap();
    let config = EngineConfig::builder()
        .trial_timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let engine = Engine::builder()
        .registry(registry)
        .datasets(["d1"])
        .algorithms(AlgorithmSet::from_descriptors([slow, zeros_like()]).unwrap())
        .config(config)
        .build()
        .unwrap();

    let summary = engine.run().await.unwrap();
    assert_eq!(summary.timed_out, 1);
    assert_eq!(summary.succeeded, 1);

    let row = engine.results().get(&TrialKey::new("d1", "slow")).unwrap();
    assert_eq!(row.status(), TrialStatus::AlgorithmError);
    assert!(row.is_timed_out());
    assert!(row.error().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_timed_out_callable_returns_before_next_sequential_trial() {
    let (_dir, registry) = fixture();
    let running = Arc::new(AtomicBool::new(false));
    let overlapped = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&running);
    let slow = AlgorithmDescriptor::from_array_fn("slow", move |v| {
        flag.store(true, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(300));
        flag.store(false, Ordering::SeqCst);
        Ok(vec![0.0; v.len()])
    })
    .unwrap();
    let flag = Arc::clone(&running);
    let seen = Arc::clone(&overlapped);
    let next = AlgorithmDescriptor::from_array_fn("next", move |v| {
        if flag.load(Ordering::SeqCst) {
            seen.store(true, Ordering::SeqCst);
        }
        Ok(vec![0.0; v.len()])
    })
    .unwrap();

    let engine = Engine::builder()
        .registry(registry)
        .datasets(["d1"])
        .algorithms(AlgorithmSet::from_descriptors([slow, next]).unwrap())
        .config(
            EngineConfig::builder()
                .trial_timeout(Duration::from_millis(50))
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let summary = engine.run().await.unwrap();
    assert_eq!(summary.timed_out, 1);
    assert_eq!(summary.succeeded, 1);
    assert!(!overlapped.load(Ordering::SeqCst));

    // The row is recorded at the limit, not when the callable returns.
    let row = engine.results().get(&TrialKey::new("d1", "slow")).unwrap();
    assert!(row.is_timed_out());
    assert!(row.duration() < Duration::from_millis(300));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_timeouts_keep_siblings_and_bound() {
    let (_dir, registry) = fixture();
    let gauge = Arc::new(Gauge::default());
    let algorithms = AlgorithmSet::from_descriptors([
        tracked("slow", Duration::from_millis(600), &gauge),
        tracked("fast", Duration::from_millis(5), &gauge),
        tracked("fast_too", Duration::from_millis(5), &gauge),
    ])
    .unwrap();
    let config = EngineConfig::builder()
        .max_workers(2)
        .trial_timeout(Duration::from_millis(150))
        .build()
        .unwrap();
    let engine = Engine::builder()
        .registry(registry)
        .datasets(["d1", "quiet"])
        .algorithms(algorithms)
        .config(config)
        .build()
        .unwrap();

    let summary = engine.run().await.unwrap();

    assert_eq!(summary.trials, 6);
    assert_eq!(summary.timed_out, 2);
    assert_eq!(summary.succeeded, 4);
    assert!(gauge.peak.load(Ordering::SeqCst) <= 2, "more than max_workers callables ran at once");

    for dataset in ["d1", "quiet"] {
        for algorithm in ["fast", "fast_too"] {
            let row = engine.results().get(&TrialKey::new(dataset, algorithm)).unwrap();
            assert_eq!(row.status(), TrialStatus::Success, "{dataset}/{algorithm}");
            assert!(!row.is_timed_out());
        }
        let slow = engine.results().get(&TrialKey::new(dataset, "slow")).unwrap();
        assert_eq!(slow.status(), TrialStatus::AlgorithmError);
        assert!(slow.is_timed_out());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_run_matches_sequential_order() {
    let (_dir, registry) = fixture();
    // Earlier trials sleep longer, so completion order is reversed.
    let algorithms = AlgorithmSet::from_descriptors([
        AlgorithmDescriptor::from_array_fn("slowest", |v| {
            std::thread::sleep(Duration::from_millis(60));
            Ok(vec![0.0; v.len()])
        })
        .unwrap(),
        AlgorithmDescriptor::from_array_fn("slow", |v| {
            std::thread::sleep(Duration::from_millis(20));
            Ok(vec![0.0; v.len()])
        })
        .unwrap(),
        failing(),
    ])
    .unwrap();
    let engine = Engine::builder()
        .registry(registry)
        .algorithms(algorithms)
        .config(EngineConfig::builder().max_workers(4).build().unwrap())
        .build()
        .unwrap();

    let summary = engine.run().await.unwrap();
    assert_eq!(summary.trials, 9);
    assert_eq!(engine.results().len(), 9);

    let rows: Vec<TrialKey> = engine.results().rows().iter().map(|r| r.key().clone()).collect();
    assert_eq!(rows, engine.plan());
}

// ============================================================================
// Re-runs and Persistence
// ============================================================================

#[tokio::test]
async fn test_rerun_overwrites_single_row() {
    let (_dir, registry) = fixture();
    let calls = Arc::new(Mutex::new(0_u32));
    let counter = Arc::clone(&calls);
    let flaky = AlgorithmDescriptor::from_array_fn("flaky", move |v| {
        let mut calls = counter.lock().unwrap();
        *calls += 1;
        if *calls == 1 {
            anyhow::bail!("first call fails");
        }
        Ok(vec![0.0; v.len()])
    })
    .unwrap();
    let engine = Engine::builder()
        .registry(registry)
        .datasets(["d1"])
        .algorithms(AlgorithmSet::from_descriptors([flaky]).unwrap())
        .build()
        .unwrap();

    engine.run().await.unwrap();
    let key = TrialKey::new("d1", "flaky");
    assert_eq!(engine.results().get(&key).unwrap().status(), TrialStatus::AlgorithmError);

    let rerun = engine.run_trial("d1", "flaky").await.unwrap();
    assert_eq!(rerun.status(), TrialStatus::Success);
    assert_eq!(engine.results().len(), 1);
    assert_eq!(engine.results().get(&key).unwrap().status(), TrialStatus::Success);

    let table = engine.into_results();
    assert_eq!(table.with_status(TrialStatus::Success).len(), 1);
}

#[tokio::test]
async fn test_file_mode_temp_files_are_removed() {
    let (_dir, registry) = fixture();
    let scratch = tempfile::tempdir().unwrap();
    let seen: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));

    let recorder = Arc::clone(&seen);
    let from_file = AlgorithmDescriptor::from_file_fn("from_file", move |path: &Path| {
        recorder.lock().unwrap().push(path.to_path_buf());
        let content = fs::read_to_string(path)?;
        Ok(content.lines().map(|_| 0.0).collect())
    })
    .unwrap();
    let recorder = Arc::clone(&seen);
    let file_failing = AlgorithmDescriptor::from_file_fn("file_failing", move |path: &Path| {
        recorder.lock().unwrap().push(path.to_path_buf());
        anyhow::bail!("cannot parse input")
    })
    .unwrap();

    let engine = Engine::builder()
        .registry(registry)
        .datasets(["d1"])
        .algorithms(AlgorithmSet::from_descriptors([from_file, file_failing]).unwrap())
        .config(EngineConfig::builder().temp_dir(scratch.path()).build().unwrap())
        .build()
        .unwrap();
    let summary = engine.run().await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.algorithm_errors, 1);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    for path in seen.iter() {
        assert!(path.starts_with(scratch.path()));
        assert!(!path.exists());
    }
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_results_dir_layout() {
    let (_dir, registry) = fixture();
    let out = tempfile::tempdir().unwrap();
    let config = EngineConfig::builder()
        .results_dir(out.path())
        .persist_scores(true)
        .build()
        .unwrap();
    let engine = Engine::builder()
        .registry(registry)
        .datasets(["d1", "missing"])
        .algorithms(AlgorithmSet::from_descriptors([identity()]).unwrap())
        .metrics(accuracy())
        .config(config)
        .build()
        .unwrap();

    let summary = engine.run().await.unwrap();
    let run_dir = summary.run_dir.unwrap();

    assert!(run_dir.starts_with(out.path()));
    assert!(run_dir.join(RESULTS_JSON).is_file());
    assert!(run_dir.join(RESULTS_PARQUET).is_file());

    let scores = fs::read_to_string(run_dir.join("identity").join("d1").join(ANOMALY_SCORES_TS)).unwrap();
    let scores: Vec<f64> = scores.lines().map(|l| l.parse().unwrap()).collect();
    assert_eq!(scores.len(), 5);
    assert!((scores[0] - 1.0).abs() < f64::EPSILON);
    assert!(scores[4].abs() < f64::EPSILON);

    // Every trial gets its row and log; failed trials persist no scores.
    let d1_dir = run_dir.join("identity").join("d1");
    let metrics = fs::read_to_string(d1_dir.join(METRICS_CSV)).unwrap();
    let mut lines = metrics.lines();
    assert_eq!(lines.next(), Some("dataset,algorithm,status,duration_secs,error,ACCURACY"));
    assert!(lines.next().unwrap().starts_with("d1,identity,success,"));
    let log = fs::read_to_string(d1_dir.join(EXECUTION_LOG)).unwrap();
    for state in ["pending", "loading", "running", "scoring", "done"] {
        assert!(log.lines().any(|l| l.ends_with(&format!(" {state}"))), "{state}");
    }
    assert!(log.ends_with("status: success\n"));

    let missing_dir = run_dir.join("identity").join("missing");
    assert!(!missing_dir.join(ANOMALY_SCORES_TS).exists());
    let metrics = fs::read_to_string(missing_dir.join(METRICS_CSV)).unwrap();
    assert!(metrics.lines().nth(1).unwrap().starts_with("missing,identity,dataset_error,"));
    let log = fs::read_to_string(missing_dir.join(EXECUTION_LOG)).unwrap();
    assert!(log.contains("status: dataset_error"));
    assert!(log.contains("error: "));
}

#[tokio::test]
async fn test_dot_identifiers_stay_inside_run_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("d1.csv"), "1.0,0\n2.0,1\n").unwrap();
    let mut registry = DatasetRegistry::new(dir.path());
    registry.register_str(r#"{"..": {"dataset": "d1.csv"}}"#).unwrap();

    let root = tempfile::tempdir().unwrap();
    let dots = AlgorithmDescriptor::from_array_fn("..", |v| Ok(vec![0.0; v.len()])).unwrap();
    let config = EngineConfig::builder()
        .results_dir(root.path().join("results"))
        .persist_scores(true)
        .build()
        .unwrap();
    let engine = Engine::builder()
        .registry(registry)
        .algorithms(AlgorithmSet::from_descriptors([dots]).unwrap())
        .config(config)
        .build()
        .unwrap();

    let summary = engine.run().await.unwrap();
    assert_eq!(summary.succeeded, 1);

    let run_dir = summary.run_dir.unwrap();
    let trial_dir = run_dir.join("%2E.").join("%2E.");
    assert!(trial_dir.join(ANOMALY_SCORES_TS).is_file());
    assert!(trial_dir.join(METRICS_CSV).is_file());
    assert!(!root.path().join(ANOMALY_SCORES_TS).exists());
    assert!(!root.path().join("results").join(ANOMALY_SCORES_TS).exists());
    assert!(!run_dir.join(ANOMALY_SCORES_TS).exists());
}
