//! Engine configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::{Error, Result};

/// Runtime options of an evaluation run.
///
/// Every field has a default, so a JSON file only needs the options it
/// changes:
///
/// ```json
/// { "max_workers": 4, "trial_timeout_secs": 30.0, "results_dir": "results" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum number of trials in flight (1 = sequential)
    pub max_workers: usize,
    /// Per-trial limit on the algorithm call, in seconds
    pub trial_timeout_secs: Option<f64>,
    /// Min-max scale predictions to `[0, 1]` before scoring
    pub normalize_scores: bool,
    /// Parent directory of timestamped run directories
    pub results_dir: Option<PathBuf>,
    /// Write prepared scores of successful trials into the run directory
    pub persist_scores: bool,
    /// Directory for file-mode temporary files (system default if unset)
    pub temp_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 1,
            trial_timeout_secs: None,
            normalize_scores: true,
            results_dir: None,
            persist_scores: false,
            temp_dir: None,
        }
    }
}

impl EngineConfig {
    /// Create a builder starting from the defaults.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Load a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file cannot be read, is not valid JSON, or
    /// fails validation.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&source)
            .map_err(|e| Error::Config(format!("invalid engine config {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Check option ranges.
    ///
    /// # Errors
    ///
    /// Returns `Config` for zero workers, a non-positive timeout, or
    /// `persist_scores` without a `results_dir`.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::Config("max_workers must be at least 1".into()));
        }
        if self.max_workers > Semaphore::MAX_PERMITS {
            return Err(Error::Config(format!(
                "max_workers must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if let Some(secs) = self.trial_timeout_secs {
            if !(secs.is_finite() && secs > 0.0) {
                return Err(Error::Config(format!(
                    "trial_timeout_secs must be a positive number of seconds, got {secs}"
                )));
            }
        }
        if self.persist_scores && self.results_dir.is_none() {
            return Err(Error::Config("persist_scores requires results_dir".into()));
        }
        Ok(())
    }

    /// Per-trial timeout as a `Duration`.
    #[must_use]
    pub fn trial_timeout(&self) -> Option<Duration> {
        self.trial_timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set the maximum number of concurrent trials.
    #[must_use]
    pub const fn max_workers(mut self, workers: usize) -> Self {
        self.config.max_workers = workers;
        self
    }

    /// Limit each algorithm call to `timeout`.
    #[must_use]
    pub fn trial_timeout(mut self, timeout: Duration) -> Self {
        self.config.trial_timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    /// Enable or disable min-max scaling of predictions.
    #[must_use]
    pub const fn normalize_scores(mut self, normalize: bool) -> Self {
        self.config.normalize_scores = normalize;
        self
    }

    /// Write run outputs under `dir`.
    #[must_use]
    pub fn results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.results_dir = Some(dir.into());
        self
    }

    /// Persist prepared scores of successful trials.
    #[must_use]
    pub const fn persist_scores(mut self, persist: bool) -> Self {
        self.config.persist_scores = persist;
        self
    }

    /// Place file-mode temporary files in `dir`.
    #[must_use]
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Config` if validation fails.
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_workers, 1);
        assert!(config.normalize_scores);
        assert!(config.trial_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_workers": 3, "trial_timeout_secs": 0.5}}"#).unwrap();

        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.trial_timeout(), Some(Duration::from_millis(500)));
        assert!(config.normalize_scores);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"workers": 3}}"#).unwrap();
        assert!(matches!(
            EngineConfig::from_json_file(file.path()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_builder_validation() {
        assert!(EngineConfig::builder().max_workers(0).build().is_err());
        assert!(EngineConfig::builder().max_workers(usize::MAX).build().is_err());
        assert!(EngineConfig::builder().persist_scores(true).build().is_err());
        assert!(EngineConfig::builder()
            .trial_timeout(Duration::ZERO)
            .build()
            .is_err());

        let config = EngineConfig::builder()
            .max_workers(2)
            .results_dir("out")
            .persist_scores(true)
            .normalize_scores(false)
            .build()
            .unwrap();
        assert_eq!(config.results_dir.as_deref(), Some(Path::new("out")));
        assert!(!config.normalize_scores);
    }
}
