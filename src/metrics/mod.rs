//! Metrics collaborator seam
//!
//! The engine does not implement quality metrics. It hands prepared
//! predictions and ground-truth labels to every [`Metric`] in a
//! [`MetricSet`] and records one [`MetricValue`] per metric. A failing
//! metric only makes its own value unavailable.
//!
//! ## Usage
//!
//! ```rust
//! use tsad_eval::metrics::{FnMetric, MetricSet, MetricValue};
//!
//! let mut metrics = MetricSet::new();
//! metrics.add(FnMetric::new("ACCURACY", |labels: &[u8], scores: &[f64]| {
//!     let hits = labels
//!         .iter()
//!         .zip(scores)
//!         .filter(|&(&l, &s)| f64::from(l) == s.round())
//!         .count();
//!     Ok(hits as f64 / labels.len() as f64)
//! }))?;
//!
//! let values = metrics.evaluate(&[0, 1], &[0.0, 1.0]);
//! assert_eq!(values[0].1, MetricValue::Score(1.0));
//! # Ok::<(), tsad_eval::Error>(())
//! ```

mod scoring;

pub use scoring::{prepare_scores, sanitize_scores, scale_min_max};

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result};

/// A named quality metric over predictions and binary labels.
pub trait Metric: Send + Sync {
    /// Column name of this metric in the results table.
    fn name(&self) -> &str;

    /// Score `scores` against `labels` (equal lengths are guaranteed).
    ///
    /// # Errors
    ///
    /// Any error marks this metric unavailable for the trial.
    fn score(&self, labels: &[u8], scores: &[f64]) -> anyhow::Result<f64>;
}

/// Adapter turning a closure into a [`Metric`].
pub struct FnMetric<F> {
    name: String,
    f: F,
}

impl<F> FnMetric<F>
where
    F: Fn(&[u8], &[f64]) -> anyhow::Result<f64> + Send + Sync,
{
    /// Create a metric from a name and a scoring closure.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Metric for FnMetric<F>
where
    F: Fn(&[u8], &[f64]) -> anyhow::Result<f64> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn score(&self, labels: &[u8], scores: &[f64]) -> anyhow::Result<f64> {
        (self.f)(labels, scores)
    }
}

/// Outcome of one metric for one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricValue {
    /// The metric was computed.
    Score(f64),
    /// The metric failed; the trial status is unaffected.
    Unavailable(String),
}

impl MetricValue {
    /// The score, if available.
    #[must_use]
    pub const fn score(&self) -> Option<f64> {
        match self {
            Self::Score(v) => Some(*v),
            Self::Unavailable(_) => None,
        }
    }

    /// Check whether the metric was computed.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Score(_))
    }
}

/// Ordered set of metrics with unique names.
#[derive(Clone, Default)]
pub struct MetricSet {
    metrics: Vec<Arc<dyn Metric>>,
}

impl fmt::Debug for MetricSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl MetricSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a metric.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a metric with the same name is already present.
    pub fn add(&mut self, metric: impl Metric + 'static) -> Result<()> {
        self.add_shared(Arc::new(metric))
    }

    /// Add a shared metric.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a metric with the same name is already present.
    pub fn add_shared(&mut self, metric: Arc<dyn Metric>) -> Result<()> {
        if self.metrics.iter().any(|m| m.name() == metric.name()) {
            return Err(Error::Config(format!(
                "metric '{}' is configured more than once",
                metric.name()
            )));
        }
        self.metrics.push(metric);
        Ok(())
    }

    /// Metric names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.metrics.iter().map(|m| m.name()).collect()
    }

    /// Number of metrics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Check if no metrics are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Compute every metric, isolating failures per metric.
    ///
    /// A length mismatch between `scores` and `labels`, an error, a panic,
    /// or a non-finite result each yield [`MetricValue::Unavailable`].
    #[must_use]
    pub fn evaluate(&self, labels: &[u8], scores: &[f64]) -> Vec<(String, MetricValue)> {
        self.metrics
            .iter()
            .map(|metric| {
                let value = match compute(metric.as_ref(), labels, scores) {
                    Ok(score) => MetricValue::Score(score),
                    Err(e) => {
                        warn!(error = %e, "Metric unavailable");
                        MetricValue::Unavailable(e.to_string())
                    }
                };
                (metric.name().to_string(), value)
            })
            .collect()
    }
}

fn compute(metric: &dyn Metric, labels: &[u8], scores: &[f64]) -> Result<f64> {
    let unavailable = |reason: String| Error::MetricUnavailable {
        metric: metric.name().to_string(),
        reason,
    };

    if labels.len() != scores.len() {
        return Err(unavailable(format!(
            "prediction length {} does not match label length {}",
            scores.len(),
            labels.len()
        )));
    }

    let outcome = catch_unwind(AssertUnwindSafe(|| metric.score(labels, scores)))
        .map_err(|_| unavailable("metric panicked".to_string()))?;

    match outcome {
        Ok(score) if score.is_finite() => Ok(score),
        Ok(score) => Err(unavailable(format!("non-finite score {score}"))),
        Err(e) => Err(unavailable(format!("{e:#}"))),
    }
}
