//! Algorithm Descriptor - a named callable plus its calling convention

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::materialize;
use crate::{Error, Result};

/// How the loaded dataset is handed to the callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// The in-memory values are passed directly.
    Array,
    /// The values are written to a temporary file whose path is passed.
    FilePath,
}

/// Input handed to an [`Algorithm`].
#[derive(Debug, Clone, Copy)]
pub enum AlgorithmInput<'a> {
    /// One observation vector per time step.
    Array(&'a [Vec<f64>]),
    /// Comma-delimited file with one row per time step.
    File(&'a Path),
}

/// Capability interface for user-supplied anomaly detectors.
///
/// The returned array should be aligned with the input (one score per time
/// step); its semantics (binary or continuous) are left to the metrics.
pub trait Algorithm: Send + Sync {
    /// Score a series.
    ///
    /// # Errors
    ///
    /// Any error is recorded as an `algorithm_error` for the trial.
    fn invoke(&self, input: AlgorithmInput<'_>) -> anyhow::Result<Vec<f64>>;
}

struct ArrayFn<F>(F);

impl<F> Algorithm for ArrayFn<F>
where
    F: Fn(&[Vec<f64>]) -> anyhow::Result<Vec<f64>> + Send + Sync,
{
    fn invoke(&self, input: AlgorithmInput<'_>) -> anyhow::Result<Vec<f64>> {
        match input {
            AlgorithmInput::Array(values) => (self.0)(values),
            AlgorithmInput::File(path) => {
                anyhow::bail!("array algorithm received file input '{}'", path.display())
            }
        }
    }
}

struct FileFn<F>(F);

impl<F> Algorithm for FileFn<F>
where
    F: Fn(&Path) -> anyhow::Result<Vec<f64>> + Send + Sync,
{
    fn invoke(&self, input: AlgorithmInput<'_>) -> anyhow::Result<Vec<f64>> {
        match input {
            AlgorithmInput::File(path) => (self.0)(path),
            AlgorithmInput::Array(_) => anyhow::bail!("file algorithm received array input"),
        }
    }
}

/// Named, immutable wrapper around an [`Algorithm`].
#[derive(Clone)]
pub struct AlgorithmDescriptor {
    name: String,
    input_mode: InputMode,
    callable: Arc<dyn Algorithm>,
}

impl fmt::Debug for AlgorithmDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlgorithmDescriptor")
            .field("name", &self.name)
            .field("input_mode", &self.input_mode)
            .finish_non_exhaustive()
    }
}

impl AlgorithmDescriptor {
    /// Wrap an [`Algorithm`] implementation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAlgorithm` if `name` is empty or whitespace.
    pub fn new(
        name: impl Into<String>,
        input_mode: InputMode,
        callable: Arc<dyn Algorithm>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidAlgorithm(
                "algorithm name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            name,
            input_mode,
            callable,
        })
    }

    /// Wrap a closure taking the in-memory values.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAlgorithm` if `name` is empty or whitespace.
    pub fn from_array_fn<F>(name: impl Into<String>, f: F) -> Result<Self>
    where
        F: Fn(&[Vec<f64>]) -> anyhow::Result<Vec<f64>> + Send + Sync + 'static,
    {
        Self::new(name, InputMode::Array, Arc::new(ArrayFn(f)))
    }

    /// Wrap a closure taking a path to the materialized values.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAlgorithm` if `name` is empty or whitespace.
    pub fn from_file_fn<F>(name: impl Into<String>, f: F) -> Result<Self>
    where
        F: Fn(&Path) -> anyhow::Result<Vec<f64>> + Send + Sync + 'static,
    {
        Self::new(name, InputMode::FilePath, Arc::new(FileFn(f)))
    }

    /// Get the algorithm name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the calling convention.
    #[must_use]
    pub const fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    /// Run the callable on `values`.
    ///
    /// In `FilePath` mode the values are first written to a temporary file
    /// (inside `temp_dir` when given). The file is removed when this call
    /// returns, whether the callable succeeded, failed, or panicked.
    ///
    /// # Errors
    ///
    /// `Algorithm` when the callable fails, `Io` when the temporary file
    /// cannot be written.
    pub fn invoke(&self, values: &[Vec<f64>], temp_dir: Option<&Path>) -> Result<Vec<f64>> {
        let outcome = match self.input_mode {
            InputMode::Array => self.callable.invoke(AlgorithmInput::Array(values)),
            InputMode::FilePath => {
                let file = materialize::write_values(values, temp_dir)?;
                self.callable.invoke(AlgorithmInput::File(file.path()))
            }
        };

        outcome.map_err(|e| Error::Algorithm {
            name: self.name.clone(),
            reason: format!("{e:#}"),
        })
    }
}
