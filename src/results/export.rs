//! Results export: serde rows, Arrow record batches, Parquet and JSON files

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};

use super::{TrialResult, TrialStatus};
use crate::{Error, Result};

/// Columns every export carries ahead of the metric columns.
pub(crate) const FIXED_COLUMNS: [&str; 5] = ["dataset", "algorithm", "status", "duration_secs", "error"];

/// One exported row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    /// Dataset identifier
    pub dataset: String,
    /// Algorithm name
    pub algorithm: String,
    /// Trial status
    pub status: TrialStatus,
    /// Algorithm wall-clock time in seconds
    pub duration_secs: f64,
    /// Failure message, if any
    pub error: Option<String>,
    /// Metric scores; `None` when unavailable or not computed
    pub metrics: BTreeMap<String, Option<f64>>,
}

/// Ordered, serializable snapshot of a results table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsExport {
    /// Metric columns in first-appearance order
    pub metric_names: Vec<String>,
    /// Rows in table order
    pub rows: Vec<ExportRow>,
}

impl ResultsExport {
    /// Build an export from rows already in table order.
    #[must_use]
    pub fn from_rows(results: &[TrialResult]) -> Self {
        let mut metric_names: Vec<String> = Vec::new();
        for result in results {
            for (name, _) in result.metrics() {
                if !metric_names.contains(name) {
                    metric_names.push(name.clone());
                }
            }
        }

        let rows = results
            .iter()
            .map(|result| {
                let metrics = metric_names
                    .iter()
                    .map(|name| {
                        let score = result.metric(name).and_then(|value| value.score());
                        (name.clone(), score)
                    })
                    .collect();
                ExportRow {
                    dataset: result.dataset().to_string(),
                    algorithm: result.algorithm().to_string(),
                    status: result.status(),
                    duration_secs: result.duration().as_secs_f64(),
                    error: result.error().map(str::to_string),
                    metrics,
                }
            })
            .collect();

        Self { metric_names, rows }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// One row as text cells in [`FIXED_COLUMNS`] + metric order.
    ///
    /// Missing values are empty cells.
    pub(crate) fn text_cells(&self, row: &ExportRow) -> Vec<String> {
        let mut cells = vec![
            row.dataset.clone(),
            row.algorithm.clone(),
            row.status.as_str().to_string(),
            row.duration_secs.to_string(),
            row.error.clone().unwrap_or_default(),
        ];
        cells.extend(self.metric_names.iter().map(|name| {
            row.metrics
                .get(name)
                .copied()
                .flatten()
                .map_or_else(String::new, |score| score.to_string())
        }));
        cells
    }

    /// Arrow schema of [`to_record_batch`](Self::to_record_batch).
    #[must_use]
    pub fn schema(&self) -> Schema {
        let mut fields = vec![
            Field::new("dataset", DataType::Utf8, false),
            Field::new("algorithm", DataType::Utf8, false),
            Field::new("status", DataType::Utf8, false),
            Field::new("duration_secs", DataType::Float64, false),
            Field::new("error", DataType::Utf8, true),
        ];
        fields.extend(
            self.metric_names
                .iter()
                .map(|name| Field::new(name, DataType::Float64, true)),
        );
        Schema::new(fields)
    }

    /// Convert to a single Arrow record batch, one metric column per metric.
    ///
    /// # Errors
    ///
    /// Returns `Export` if a metric name collides with a fixed column, or
    /// `Arrow` if the batch cannot be assembled.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        if let Some(clash) = self
            .metric_names
            .iter()
            .find(|n| FIXED_COLUMNS.contains(&n.as_str()))
        {
            return Err(Error::Export(format!(
                "metric name '{clash}' collides with a fixed results column"
            )));
        }

        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(
                self.rows.iter().map(|r| r.dataset.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                self.rows.iter().map(|r| r.algorithm.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                self.rows.iter().map(|r| r.status.as_str()),
            )),
            Arc::new(Float64Array::from_iter_values(
                self.rows.iter().map(|r| r.duration_secs),
            )),
            Arc::new(StringArray::from(
                self.rows.iter().map(|r| r.error.clone()).collect::<Vec<Option<String>>>(),
            )),
        ];
        for name in &self.metric_names {
            let scores: Vec<Option<f64>> = self
                .rows
                .iter()
                .map(|r| r.metrics.get(name).copied().flatten())
                .collect();
            columns.push(Arc::new(Float64Array::from(scores)));
        }

        Ok(RecordBatch::try_new(Arc::new(self.schema()), columns)?)
    }

    /// Write the export as a Parquet file.
    ///
    /// # Errors
    ///
    /// Returns `Io`, `Arrow` or `Parquet` errors from writing.
    pub fn write_parquet(&self, path: impl AsRef<Path>) -> Result<()> {
        let batch = self.to_record_batch()?;
        let file = File::create(path.as_ref())?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }

    /// Write the export as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Json` errors from writing.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}
