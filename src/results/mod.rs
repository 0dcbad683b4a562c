//! Results Store
//!
//! One row per (dataset, algorithm) trial, holding status, timing, and
//! metric scores.
//!
//! ## Schema
//!
//! ```text
//! ResultsTable ──< TrialResult  keyed by TrialKey { dataset, algorithm }
//!                      │
//!                      └──< (metric name, MetricValue)
//!
//! export() ─▶ ResultsExport ─▶ JSON | Arrow RecordBatch | Parquet
//! RunDirectory ─▶ per-trial metrics.csv, execution.log, anomaly_scores.ts
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use tsad_eval::results::{GroupBy, ResultsTable, TrialKey, TrialResult};
//!
//! let table = ResultsTable::new();
//! table.append(TrialResult::success(TrialKey::new("d1", "zeros"), Duration::ZERO, vec![]));
//! table.append(TrialResult::dataset_error(TrialKey::new("d2", "zeros"), "missing file"));
//!
//! assert_eq!(table.len(), 2);
//! assert_eq!(table.group_by(GroupBy::Algorithm).len(), 1);
//! assert_eq!(table.export().rows[1].status.as_str(), "dataset_error");
//! ```

mod export;
mod table;
mod trial_result;
mod writer;

pub use export::{ExportRow, ResultsExport};
pub use table::{GroupBy, ResultsTable};
pub use trial_result::{TrialKey, TrialResult, TrialStatus};
pub use writer::{
    RunDirectory, ANOMALY_SCORES_TS, EXECUTION_LOG, METRICS_CSV, RESULTS_JSON, RESULTS_PARQUET,
};
