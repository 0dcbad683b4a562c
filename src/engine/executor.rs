//! Engine - plans trials, runs them, and collects the results table

use std::any::Any;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use super::config::EngineConfig;
use super::trial::{Trial, TrialState};
use crate::algorithm::{AlgorithmDescriptor, AlgorithmSet};
use crate::dataset::DatasetRegistry;
use crate::metrics::{prepare_scores, MetricSet, MetricValue};
use crate::results::{ResultsTable, RunDirectory, TrialKey, TrialResult, TrialStatus};
use crate::{Error, Result};

/// Counts of one evaluation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the last trial finished
    pub finished_at: DateTime<Utc>,
    /// Number of planned trials
    pub trials: usize,
    /// Trials with status `success`
    pub succeeded: usize,
    /// Trials with status `algorithm_error` (timeouts included)
    pub algorithm_errors: usize,
    /// Trials with status `dataset_error`
    pub dataset_errors: usize,
    /// Algorithm errors caused by the per-trial timeout
    pub timed_out: usize,
    /// Run directory, when `results_dir` is configured
    pub run_dir: Option<PathBuf>,
}

/// State shared by all trials of an engine.
struct Shared {
    registry: DatasetRegistry,
    metrics: MetricSet,
    config: EngineConfig,
    /// One permit per callable allowed to run. A permit is held from dataset
    /// loading until scoring ends, and by a timed-out callable until it
    /// actually returns.
    slots: Arc<Semaphore>,
}

/// Evaluation engine.
///
/// Owns its configuration and its [`ResultsTable`]. Trials run in
/// dataset-major order: every algorithm on the first dataset, then every
/// algorithm on the second, and so on.
pub struct Engine {
    shared: Arc<Shared>,
    datasets: Vec<String>,
    algorithms: AlgorithmSet,
    results: ResultsTable,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("datasets", &self.datasets)
            .field("algorithms", &self.algorithms.names())
            .field("metrics", &self.shared.metrics)
            .field("config", &self.shared.config)
            .field("rows", &self.results.len())
            .finish()
    }
}

impl Engine {
    /// Create a new engine builder.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Dataset identifiers in evaluation order.
    #[must_use]
    pub fn datasets(&self) -> &[String] {
        &self.datasets
    }

    /// Get the algorithm set.
    #[must_use]
    pub const fn algorithms(&self) -> &AlgorithmSet {
        &self.algorithms
    }

    /// Get the results table.
    #[must_use]
    pub const fn results(&self) -> &ResultsTable {
        &self.results
    }

    /// Consume the engine and keep its results.
    #[must_use]
    pub fn into_results(self) -> ResultsTable {
        self.results
    }

    /// All planned trials, datasets outer and algorithms inner.
    #[must_use]
    pub fn plan(&self) -> Vec<TrialKey> {
        self.planned().into_iter().map(|(key, _)| key).collect()
    }

    fn planned(&self) -> Vec<(TrialKey, Arc<AlgorithmDescriptor>)> {
        self.datasets
            .iter()
            .flat_map(|dataset| {
                self.algorithms
                    .iter()
                    .map(move |algorithm| (TrialKey::new(dataset, algorithm.name()), Arc::clone(algorithm)))
            })
            .collect()
    }

    /// Run every planned trial and record one row per trial.
    ///
    /// Trial failures never abort the run. With `results_dir` configured,
    /// the table is written to a new timestamped run directory afterwards.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the run directory cannot be created, or an export
    /// error if the results cannot be written. The in-memory table is
    /// complete either way once trials have started.
    pub async fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let run_dir = match &self.shared.config.results_dir {
            Some(base) => Some(Arc::new(RunDirectory::create(base, started_at)?)),
            None => None,
        };

        let plan = self.planned();
        let keys: Vec<TrialKey> = plan.iter().map(|(key, _)| key.clone()).collect();
        self.results.declare_order(&keys);

        let workers = self.shared.config.max_workers.max(1);
        info!(
            trials = plan.len(),
            datasets = self.datasets.len(),
            algorithms = self.algorithms.len(),
            workers,
            "Starting evaluation run"
        );

        if workers == 1 {
            for (key, algorithm) in plan {
                // Waits for a timed-out callable of an earlier trial to return.
                let Some(permit) = self.acquire_slot().await else {
                    break;
                };
                let span = trial_span(&key);
                let result =
                    execute_trial(Arc::clone(&self.shared), key, algorithm, run_dir.clone(), permit)
                        .instrument(span)
                        .await;
                self.results.append(result);
            }
        } else {
            self.run_concurrent(plan, run_dir.as_ref()).await;
        }

        // A trial task that died without reporting still owns a row.
        for key in &keys {
            if self.results.get(key).is_none() {
                error!(trial = %key, "Trial finished without a result");
                self.results.append(TrialResult::algorithm_error(
                    key.clone(),
                    std::time::Duration::ZERO,
                    "trial task terminated without a result",
                ));
            }
        }

        if let Some(dir) = &run_dir {
            dir.write_results(&self.results.export())?;
        }

        let summary = self.summarize(started_at, &keys, run_dir.as_deref());
        info!(
            succeeded = summary.succeeded,
            algorithm_errors = summary.algorithm_errors,
            dataset_errors = summary.dataset_errors,
            "Evaluation run finished"
        );
        Ok(summary)
    }

    async fn acquire_slot(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.shared.slots).acquire_owned().await.ok()
    }

    async fn run_concurrent(
        &self,
        plan: Vec<(TrialKey, Arc<AlgorithmDescriptor>)>,
        run_dir: Option<&Arc<RunDirectory>>,
    ) {
        let mut tasks = JoinSet::new();

        for (key, algorithm) in plan {
            let Some(permit) = self.acquire_slot().await else {
                break;
            };
            let span = trial_span(&key);
            let shared = Arc::clone(&self.shared);
            let run_dir = run_dir.cloned();
            tasks.spawn(execute_trial(shared, key, algorithm, run_dir, permit).instrument(span));
        }

        while let Some(joined) = tasks.join_next().await {
            self.record_joined(joined);
        }
    }

    fn record_joined(&self, joined: std::result::Result<TrialResult, JoinError>) {
        match joined {
            Ok(result) => {
                self.results.append(result);
            }
            Err(e) => error!(error = %e, "Trial task failed"),
        }
    }

    /// Re-run a single trial and overwrite its row.
    ///
    /// The dataset need not be part of this engine's dataset list; an
    /// unknown identifier is recorded as a `dataset_error` row. Nothing is
    /// written to disk.
    ///
    /// The trial waits for a free worker slot like any other, so it never
    /// runs alongside more than `max_workers - 1` other callables.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAlgorithm` if no algorithm named `algorithm` is
    /// registered with this engine.
    pub async fn run_trial(&self, dataset: &str, algorithm: &str) -> Result<TrialResult> {
        let descriptor = self
            .algorithms
            .get(algorithm)
            .cloned()
            .ok_or_else(|| Error::InvalidAlgorithm(format!("unknown algorithm '{algorithm}'")))?;
        let permit = self
            .acquire_slot()
            .await
            .ok_or_else(|| Error::Config("engine worker slots are closed".into()))?;

        let key = TrialKey::new(dataset, algorithm);
        let span = trial_span(&key);
        let result = execute_trial(Arc::clone(&self.shared), key, descriptor, None, permit)
            .instrument(span)
            .await;

        if self.results.append(result.clone()) {
            debug!(trial = %result.key(), "Replaced previous result");
        }
        Ok(result)
    }

    fn summarize(
        &self,
        started_at: DateTime<Utc>,
        keys: &[TrialKey],
        run_dir: Option<&RunDirectory>,
    ) -> RunSummary {
        let mut summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            trials: keys.len(),
            succeeded: 0,
            algorithm_errors: 0,
            dataset_errors: 0,
            timed_out: 0,
            run_dir: run_dir.map(|dir| dir.path().to_path_buf()),
        };

        for row in keys.iter().filter_map(|key| self.results.get(key)) {
            match row.status() {
                TrialStatus::Success => summary.succeeded += 1,
                TrialStatus::AlgorithmError => summary.algorithm_errors += 1,
                TrialStatus::DatasetError => summary.dataset_errors += 1,
            }
            if row.is_timed_out() {
                summary.timed_out += 1;
            }
        }

        summary
    }
}

fn trial_span(key: &TrialKey) -> Span {
    info_span!("trial", dataset = %key.dataset, algorithm = %key.algorithm)
}

/// Run one trial and, with a run directory, write its per-trial files.
/// Never fails: every outcome is a row.
async fn execute_trial(
    shared: Arc<Shared>,
    key: TrialKey,
    algorithm: Arc<AlgorithmDescriptor>,
    run_dir: Option<Arc<RunDirectory>>,
    permit: OwnedSemaphorePermit,
) -> TrialResult {
    let mut trial = Trial::new(key);
    let result = drive_trial(&shared, &mut trial, &algorithm, run_dir.as_ref(), permit).await;

    if let Some(dir) = run_dir {
        let row = result.clone();
        let log = trial.execution_log();
        let span = Span::current();
        let written = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            dir.write_trial(&row, &log)
        })
        .await;
        match written {
            Ok(Ok(path)) => debug!(path = %path.display(), "Wrote trial outputs"),
            Ok(Err(e)) => warn!(error = %e, "Could not write trial outputs"),
            Err(e) => warn!(error = %join_error_message(e), "Could not write trial outputs"),
        }
    }

    result
}

/// Drive one trial through its states.
///
/// `permit` is released when scoring ends, or, after a timeout, only once
/// the detached callable returns.
async fn drive_trial(
    shared: &Arc<Shared>,
    trial: &mut Trial,
    algorithm: &Arc<AlgorithmDescriptor>,
    run_dir: Option<&Arc<RunDirectory>>,
    permit: OwnedSemaphorePermit,
) -> TrialResult {
    // Loading
    trial.advance(TrialState::Loading);
    let loaded = {
        let shared = Arc::clone(shared);
        let identifier = trial.key().dataset.clone();
        let span = Span::current();
        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            shared.registry.load(&identifier)
        })
        .await
    };
    let dataset = match loaded {
        Ok(Ok(dataset)) => dataset,
        Ok(Err(e)) => {
            warn!(error = %e, "Dataset could not be loaded");
            trial.note(e.to_string());
            trial.advance(TrialState::Error);
            return TrialResult::dataset_error(trial.key().clone(), e.to_string());
        }
        Err(e) => {
            let message = format!("dataset loader failed: {}", join_error_message(e));
            warn!(error = %message, "Dataset could not be loaded");
            trial.note(message.clone());
            trial.advance(TrialState::Error);
            return TrialResult::dataset_error(trial.key().clone(), message);
        }
    };
    debug!(length = dataset.len(), "Dataset loaded");
    trial.note(format!("loaded {} time step(s)", dataset.len()));

    // Running
    trial.advance(TrialState::Running);
    let (values, labels) = dataset.into_parts();
    let temp_dir = shared.config.temp_dir.clone();
    let started = Instant::now();
    let handle = {
        let algorithm = Arc::clone(algorithm);
        let span = Span::current();
        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let outcome = algorithm.invoke(&values, temp_dir.as_deref());
            (outcome, permit)
        })
    };

    let joined = match shared.config.trial_timeout() {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                // The blocking worker cannot be interrupted. It keeps its
                // permit, so no further callable starts in its slot until it
                // returns; its output is discarded.
                let duration = started.elapsed();
                let e = Error::Timeout {
                    name: algorithm.name().to_string(),
                    limit,
                };
                warn!(error = %e, "Algorithm timed out");
                trial.note(format!("{e}; worker slot held until the callable returns"));
                trial.advance(TrialState::Error);
                return TrialResult::timed_out(trial.key().clone(), duration, e.to_string());
            }
        },
        None => handle.await,
    };
    let duration = started.elapsed();

    let (prediction, permit) = match joined {
        Ok((Ok(prediction), permit)) => (prediction, permit),
        Ok((Err(e), _permit)) => {
            warn!(error = %e, "Algorithm failed");
            trial.note(e.to_string());
            trial.advance(TrialState::Error);
            return TrialResult::algorithm_error(trial.key().clone(), duration, e.to_string());
        }
        Err(e) => {
            let message = format!(
                "algorithm '{}' panicked: {}",
                algorithm.name(),
                join_error_message(e)
            );
            warn!(error = %message, "Algorithm failed");
            trial.note(message.clone());
            trial.advance(TrialState::Error);
            return TrialResult::algorithm_error(trial.key().clone(), duration, message);
        }
    };
    debug!(elapsed_ms = duration.as_millis(), "Algorithm finished");
    trial.note(format!(
        "algorithm returned {} score(s) in {:.3}s",
        prediction.len(),
        duration.as_secs_f64()
    ));

    // Scoring
    trial.advance(TrialState::Scoring);
    let scored = {
        let shared = Arc::clone(shared);
        let key = trial.key().clone();
        let run_dir = run_dir.cloned();
        let span = Span::current();
        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let scores = prepare_scores(prediction, shared.config.normalize_scores);
            let metrics = shared.metrics.evaluate(&labels, &scores);
            if let Some(dir) = run_dir.filter(|_| shared.config.persist_scores) {
                if let Err(e) = dir.write_scores(&key, &scores) {
                    warn!(error = %e, "Could not persist anomaly scores");
                }
            }
            metrics
        })
        .await
    };
    drop(permit);

    let metrics = scored.unwrap_or_else(|e| {
        let reason = format!("scoring failed: {}", join_error_message(e));
        warn!(error = %reason, "Metrics unavailable");
        shared
            .metrics
            .names()
            .into_iter()
            .map(|name| (name.to_string(), MetricValue::Unavailable(reason.clone())))
            .collect()
    });
    for (_, value) in &metrics {
        if let MetricValue::Unavailable(reason) = value {
            trial.note(reason.clone());
        }
    }

    trial.advance(TrialState::Done);
    info!(elapsed_ms = duration.as_millis(), "Trial succeeded");
    TrialResult::success(trial.key().clone(), duration, metrics)
}

fn join_error_message(e: JoinError) -> String {
    if e.is_panic() {
        panic_message(e.into_panic().as_ref())
    } else {
        e.to_string()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Builder for [`Engine`].
#[derive(Default)]
pub struct EngineBuilder {
    registry: Option<DatasetRegistry>,
    datasets: Option<Vec<String>>,
    algorithms: AlgorithmSet,
    metrics: MetricSet,
    config: EngineConfig,
}

impl EngineBuilder {
    /// Set the dataset registry (required).
    #[must_use]
    pub fn registry(mut self, registry: DatasetRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Evaluate only these datasets, in this order.
    ///
    /// Defaults to every registered dataset in registration order.
    #[must_use]
    pub fn datasets<I, S>(mut self, datasets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.datasets = Some(datasets.into_iter().map(Into::into).collect());
        self
    }

    /// Set the algorithms to evaluate.
    #[must_use]
    pub fn algorithms(mut self, algorithms: AlgorithmSet) -> Self {
        self.algorithms = algorithms;
        self
    }

    /// Set the metrics computed for successful trials.
    #[must_use]
    pub fn metrics(mut self, metrics: MetricSet) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set the engine configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the engine.
    ///
    /// # Errors
    ///
    /// Returns `Config` if no registry was given, the configuration is
    /// invalid, or a dataset identifier is listed twice.
    pub fn build(self) -> Result<Engine> {
        let registry = self
            .registry
            .ok_or_else(|| Error::Config("engine requires a dataset registry".into()))?;
        self.config.validate()?;

        let datasets = match self.datasets {
            Some(datasets) => {
                if let Some(dup) = first_duplicate(&datasets) {
                    return Err(Error::Config(format!("dataset '{dup}' is listed more than once")));
                }
                datasets
            }
            None => registry.identifiers().into_iter().map(str::to_string).collect(),
        };

        let slots = Arc::new(Semaphore::new(self.config.max_workers));
        Ok(Engine {
            shared: Arc::new(Shared {
                registry,
                metrics: self.metrics,
                config: self.config,
                slots,
            }),
            datasets,
            algorithms: self.algorithms,
            results: ResultsTable::new(),
        })
    }
}

fn first_duplicate(ids: &[String]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().map(String::as_str).find(|id| !seen.insert(*id))
}
