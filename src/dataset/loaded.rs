//! Loaded Dataset - normalized in-memory series and labels

use serde::{Deserialize, Serialize};

/// A dataset loaded from disk and normalized into aligned arrays.
///
/// `values[i]` is the (possibly multi-dimensional) observation at time step
/// `i` and `labels[i]` is its binary anomaly flag.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDataset {
    values: Vec<Vec<f64>>,
    labels: Vec<u8>,
}

impl LoadedDataset {
    /// Build a dataset from aligned values and labels.
    ///
    /// Returns `None` when the lengths differ or a label is not 0/1.
    #[must_use]
    pub fn new(values: Vec<Vec<f64>>, labels: Vec<u8>) -> Option<Self> {
        if values.len() != labels.len() || labels.iter().any(|&l| l > 1) {
            return None;
        }
        Some(Self { values, labels })
    }

    /// Observations, one vector per time step.
    #[must_use]
    pub fn values(&self) -> &[Vec<f64>] {
        &self.values
    }

    /// Binary anomaly flags, one per time step.
    #[must_use]
    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Number of time steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check whether the dataset has no time steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Split into owned values and labels.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Vec<f64>>, Vec<u8>) {
        (self.values, self.labels)
    }

    /// Descriptive statistics about shape and contamination.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn summary(&self) -> DatasetSummary {
        let length = self.len();
        let anomalous_points = self.labels.iter().filter(|&&l| l == 1).count();
        // A sequence starts at every 1 not preceded by a 1.
        let num_anomalies = self
            .labels
            .iter()
            .enumerate()
            .filter(|&(idx, &l)| l == 1 && (idx == 0 || self.labels[idx - 1] == 0))
            .count();
        let contamination = if length == 0 {
            0.0
        } else {
            anomalous_points as f64 / length as f64
        };

        DatasetSummary {
            length,
            dimensions: self.values.first().map_or(0, Vec::len),
            num_anomalies,
            anomalous_points,
            contamination,
        }
    }
}

/// Shape and label statistics of a loaded dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    /// Number of time steps
    pub length: usize,
    /// Width of each observation vector
    pub dimensions: usize,
    /// Number of anomalous sequences (maximal runs of anomalous time steps)
    pub num_anomalies: usize,
    /// Number of time steps flagged anomalous
    pub anomalous_points: usize,
    /// Fraction of anomalous time steps
    pub contamination: f64,
}
