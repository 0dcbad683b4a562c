//! Run directory layout on disk
//!
//! ```text
//! <results_dir>/<YYYY_MM_DD_HH_MM_SS>/
//!   results.json
//!   results.parquet
//!   <algorithm>/<dataset>/
//!     metrics.csv          (every trial)
//!     execution.log        (every trial)
//!     anomaly_scores.ts    (successful trials, when scores are persisted)
//! ```
//!
//! Algorithm names and dataset identifiers are percent-encoded into single
//! path components. The encoding is injective and never yields `.` or `..`,
//! so every trial gets its own directory inside the run directory.

use std::fmt::Write as _;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use super::export::FIXED_COLUMNS;
use super::{ResultsExport, TrialKey, TrialResult};
use crate::Result;

/// File name of the JSON export inside a run directory.
pub const RESULTS_JSON: &str = "results.json";
/// File name of the Parquet export inside a run directory.
pub const RESULTS_PARQUET: &str = "results.parquet";
/// File name of persisted per-trial scores.
pub const ANOMALY_SCORES_TS: &str = "anomaly_scores.ts";
/// File name of the per-trial results row.
pub const METRICS_CSV: &str = "metrics.csv";
/// File name of the per-trial execution log.
pub const EXECUTION_LOG: &str = "execution.log";

/// Timestamped output directory of one evaluation run.
#[derive(Debug, Clone)]
pub struct RunDirectory {
    path: PathBuf,
}

impl RunDirectory {
    /// Create `<base>/<timestamp>/` for a run started at `started_at`.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory cannot be created.
    pub fn create(base: impl AsRef<Path>, started_at: DateTime<Utc>) -> Result<Self> {
        let path = base
            .as_ref()
            .join(started_at.format("%Y_%m_%d_%H_%M_%S").to_string());
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the outputs of one trial.
    #[must_use]
    pub fn trial_dir(&self, key: &TrialKey) -> PathBuf {
        self.path
            .join(encode_component(&key.algorithm))
            .join(encode_component(&key.dataset))
    }

    /// Persist prepared scores of one trial, one value per line.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be written.
    pub fn write_scores(&self, key: &TrialKey, scores: &[f64]) -> Result<PathBuf> {
        let dir = self.trial_dir(key);
        fs::create_dir_all(&dir)?;
        let path = dir.join(ANOMALY_SCORES_TS);

        let mut writer = BufWriter::new(fs::File::create(&path)?);
        for score in scores {
            writeln!(writer, "{score}")?;
        }
        writer.flush()?;
        Ok(path)
    }

    /// Write the row of one trial as `metrics.csv` and its log lines as
    /// `execution.log`, whatever the trial's status.
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Csv` if either file cannot be written.
    pub fn write_trial(&self, result: &TrialResult, log: &[String]) -> Result<PathBuf> {
        let dir = self.trial_dir(result.key());
        fs::create_dir_all(&dir)?;

        let export = ResultsExport::from_rows(std::slice::from_ref(result));
        let mut metrics = csv::Writer::from_path(dir.join(METRICS_CSV))?;
        metrics.write_record(
            FIXED_COLUMNS
                .iter()
                .copied()
                .chain(export.metric_names.iter().map(String::as_str)),
        )?;
        for row in &export.rows {
            metrics.write_record(export.text_cells(row))?;
        }
        metrics.flush()?;

        let mut writer = BufWriter::new(fs::File::create(dir.join(EXECUTION_LOG))?);
        for line in log {
            writeln!(writer, "{line}")?;
        }
        writeln!(writer, "status: {}", result.status())?;
        if let Some(error) = result.error() {
            writeln!(writer, "error: {error}")?;
        }
        writer.flush()?;
        Ok(dir)
    }

    /// Write `results.json` and `results.parquet`.
    ///
    /// # Errors
    ///
    /// Returns the first export error encountered.
    pub fn write_results(&self, export: &ResultsExport) -> Result<()> {
        export.write_json(self.path.join(RESULTS_JSON))?;
        export.write_parquet(self.path.join(RESULTS_PARQUET))?;
        info!(path = %self.path.display(), rows = export.len(), "Wrote results");
        Ok(())
    }
}

/// Encode a name as one path component.
///
/// ASCII alphanumerics, `_`, `-` and non-leading `.` are kept; every other
/// byte becomes `%XX`. The empty name becomes `%`, which no other name can
/// produce.
fn encode_component(name: &str) -> String {
    if name.is_empty() {
        return "%".to_string();
    }
    let mut out = String::with_capacity(name.len());
    for (idx, byte) in name.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric()
            || matches!(byte, b'_' | b'-')
            || (byte == b'.' && idx > 0);
        if keep {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}
