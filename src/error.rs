//! Error types for tsad-eval
//!
//! Configuration and registration errors are fatal and surface before any
//! trial runs. Dataset and algorithm errors are scoped to a single trial and
//! end up as a status in the results table instead of propagating.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// tsad-eval error types
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed dataset configuration (fatal to the run)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dataset identifier is not present in the registry
    #[error("Unknown dataset: '{0}'")]
    UnknownDataset(String),

    /// Label file cannot be read as dense flags or sparse indices
    #[error("Label format error in '{path}': {reason}")]
    LabelFormat {
        /// File holding the labels
        path: PathBuf,
        /// What made the labels inconsistent with the data
        reason: String,
    },

    /// Data file is not a delimited numeric table
    #[error("Data format error in '{path}' (line {line}): {reason}")]
    DataFormat {
        /// File being parsed
        path: PathBuf,
        /// 1-based line number
        line: usize,
        /// Parse failure description
        reason: String,
    },

    /// Algorithm descriptor could not be constructed
    #[error("Invalid algorithm: {0}")]
    InvalidAlgorithm(String),

    /// Algorithm name registered twice in one run
    #[error("Duplicate algorithm name: '{0}'")]
    DuplicateAlgorithm(String),

    /// User-supplied callable failed
    #[error("Algorithm '{name}' failed: {reason}")]
    Algorithm {
        /// Algorithm name
        name: String,
        /// Error message reported by (or about) the callable
        reason: String,
    },

    /// User-supplied callable exceeded the per-trial timeout
    #[error("Algorithm '{name}' timed out after {}s", .limit.as_secs_f64())]
    Timeout {
        /// Algorithm name
        name: String,
        /// Configured limit
        limit: Duration,
    },

    /// A single metric could not be computed for a trial
    #[error("Metric '{metric}' unavailable: {reason}")]
    MetricUnavailable {
        /// Metric name
        metric: String,
        /// Why the score is missing
        reason: String,
    },

    /// Results could not be exported
    #[error("Export error: {0}")]
    Export(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

impl Error {
    /// Whether this error belongs to the dataset-loading phase of a trial.
    ///
    /// Such errors are recorded as `dataset_error` instead of failing the run.
    #[must_use]
    pub const fn is_dataset_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownDataset(_) | Self::LabelFormat { .. } | Self::DataFormat { .. } | Self::Io(_)
        )
    }

    /// Whether this error was raised by (or on behalf of) a user callable.
    #[must_use]
    pub const fn is_algorithm_error(&self) -> bool {
        matches!(self, Self::Algorithm { .. } | Self::Timeout { .. })
    }
}
