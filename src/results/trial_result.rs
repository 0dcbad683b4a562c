//! Trial Result - one row of the results table

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::MetricValue;

/// Key of a results row: one dataset evaluated by one algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrialKey {
    /// Dataset identifier
    pub dataset: String,
    /// Algorithm name
    pub algorithm: String,
}

impl TrialKey {
    /// Create a key.
    #[must_use]
    pub fn new(dataset: impl Into<String>, algorithm: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            algorithm: algorithm.into(),
        }
    }
}

impl fmt::Display for TrialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.algorithm, self.dataset)
    }
}

/// Final status of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    /// Algorithm returned a prediction and metrics were attempted.
    Success,
    /// The callable failed, panicked, or timed out.
    AlgorithmError,
    /// The dataset could not be resolved or loaded.
    DatasetError,
}

impl TrialStatus {
    /// Stable lowercase name used in exports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::AlgorithmError => "algorithm_error",
            Self::DatasetError => "dataset_error",
        }
    }
}

impl fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    key: TrialKey,
    status: TrialStatus,
    duration: Duration,
    error: Option<String>,
    timed_out: bool,
    metrics: Vec<(String, MetricValue)>,
    finished_at: DateTime<Utc>,
}

impl TrialResult {
    /// A successful trial with its metric outcomes.
    #[must_use]
    pub fn success(key: TrialKey, duration: Duration, metrics: Vec<(String, MetricValue)>) -> Self {
        Self {
            key,
            status: TrialStatus::Success,
            duration,
            error: None,
            timed_out: false,
            metrics,
            finished_at: Utc::now(),
        }
    }

    /// A trial whose callable failed after running for `duration`.
    #[must_use]
    pub fn algorithm_error(key: TrialKey, duration: Duration, message: impl Into<String>) -> Self {
        Self {
            key,
            status: TrialStatus::AlgorithmError,
            duration,
            error: Some(message.into()),
            timed_out: false,
            metrics: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    /// A trial cancelled by the per-trial timeout.
    #[must_use]
    pub fn timed_out(key: TrialKey, duration: Duration, message: impl Into<String>) -> Self {
        Self {
            timed_out: true,
            ..Self::algorithm_error(key, duration, message)
        }
    }

    /// A trial whose dataset could not be loaded.
    #[must_use]
    pub fn dataset_error(key: TrialKey, message: impl Into<String>) -> Self {
        Self {
            key,
            status: TrialStatus::DatasetError,
            duration: Duration::ZERO,
            error: Some(message.into()),
            timed_out: false,
            metrics: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    /// Get the row key.
    #[must_use]
    pub const fn key(&self) -> &TrialKey {
        &self.key
    }

    /// Get the dataset identifier.
    #[must_use]
    pub fn dataset(&self) -> &str {
        &self.key.dataset
    }

    /// Get the algorithm name.
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.key.algorithm
    }

    /// Get the trial status.
    #[must_use]
    pub const fn status(&self) -> TrialStatus {
        self.status
    }

    /// Wall-clock duration of the algorithm call (zero for dataset errors).
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Error message for failed trials.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether the trial failed because of the per-trial timeout.
    #[must_use]
    pub const fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    /// Metric outcomes in configuration order (empty unless successful).
    #[must_use]
    pub fn metrics(&self) -> &[(String, MetricValue)] {
        &self.metrics
    }

    /// Look up one metric outcome by name.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<&MetricValue> {
        self.metrics
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    /// When the trial finished.
    #[must_use]
    pub const fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }
}
