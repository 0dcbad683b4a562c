//! # tsad-eval: Time-Series Anomaly Detection Evaluation Harness
//!
//! **Version**: 0.1.0
//!
//! Runs anomaly-detection algorithms against registered time-series
//! datasets and records quality and timing metrics per trial.
//!
//! ## Components
//!
//! - [`dataset`]: identifier → files registry, loading into `(values, labels)`
//! - [`algorithm`]: named callables with an input-mode tag
//! - [`metrics`]: metric seam and score preparation
//! - [`engine`]: trial planning, per-trial state machine, timeouts, workers
//! - [`results`]: keyed results table, JSON / Arrow / Parquet export
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use tsad_eval::{AlgorithmDescriptor, AlgorithmSet, DatasetRegistry, Engine};
//!
//! # #[tokio::main]
//! # async fn main() -> tsad_eval::Result<()> {
//! let mut registry = DatasetRegistry::new("data");
//! registry.register_file("data/datasets.json")?;
//!
//! let algorithms = AlgorithmSet::from_descriptors([AlgorithmDescriptor::from_array_fn(
//!     "first_channel",
//!     |values| Ok(values.iter().map(|row| row[0]).collect()),
//! )?])?;
//!
//! let engine = Engine::builder()
//!     .registry(registry)
//!     .algorithms(algorithms)
//!     .build()?;
//! engine.run().await?;
//!
//! for row in engine.results().rows() {
//!     println!("{}: {}", row.key(), row.status());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod algorithm;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod results;

pub use algorithm::{Algorithm, AlgorithmDescriptor, AlgorithmSet, InputMode};
pub use dataset::{DatasetRegistry, LoadedDataset};
pub use engine::{Engine, EngineConfig, RunSummary};
pub use error::{Error, Result};
pub use metrics::{FnMetric, Metric, MetricSet, MetricValue};
pub use results::{ResultsTable, TrialKey, TrialResult, TrialStatus};
