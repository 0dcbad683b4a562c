//! Dataset Registry - identifier → file locations, plus loading
//!
//! ## Configuration Format
//!
//! ```json
//! {
//!   "d1": { "data": "d1/data.csv", "labels": "d1/labels.csv" },
//!   "d2": { "dataset": "d2.csv" },
//!   "d3": { "data": "d3/data.csv", "labels": "d3/idx.csv", "labels_format": "sparse" }
//! }
//! ```
//!
//! Paths are resolved relative to the registry's base directory.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use tracing::{debug, info};

use super::entry::{DatasetEntry, DatasetSpec, LabelLayout};
use super::loaded::LoadedDataset;
use super::loader;
use crate::{Error, Result};

/// Default cell delimiter for dataset files.
pub const DEFAULT_DELIMITER: u8 = b',';

/// Registry of datasets available for evaluation.
///
/// Entries keep their registration order, which is the default dataset order
/// of an evaluation run. Loading always re-reads from disk; nothing is cached.
#[derive(Debug, Clone)]
pub struct DatasetRegistry {
    base_dir: PathBuf,
    delimiter: u8,
    entries: Vec<DatasetEntry>,
    index: HashMap<String, usize>,
}

impl Default for DatasetRegistry {
    fn default() -> Self {
        Self::new(".")
    }
}

impl DatasetRegistry {
    /// Create an empty registry resolving relative paths against `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            delimiter: DEFAULT_DELIMITER,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Use a different cell delimiter (a single byte, e.g. `b'\t'`) when
    /// loading files.
    #[must_use]
    pub const fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Base directory for relative paths.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Number of registered datasets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no datasets are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered identifiers in registration order.
    #[must_use]
    pub fn identifiers(&self) -> Vec<&str> {
        self.entries.iter().map(DatasetEntry::identifier).collect()
    }

    /// Register every dataset described by a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file cannot be read or any entry is invalid.
    /// Nothing is registered when an error is returned.
    pub fn register_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "failed to read dataset configuration '{}': {e}",
                path.display()
            ))
        })?;
        self.register_str(&content)
    }

    /// Register every dataset described by a JSON configuration string.
    ///
    /// Returns the number of datasets added.
    ///
    /// # Errors
    ///
    /// Returns `Config` when the JSON is malformed, an entry supplies neither
    /// or both layouts, or an identifier is duplicated (within the source or
    /// against the registry). Nothing is registered when an error is returned.
    pub fn register_str(&mut self, source: &str) -> Result<usize> {
        let ConfigEntries(raw) = serde_json::from_str(source)
            .map_err(|e| Error::Config(format!("invalid dataset configuration: {e}")))?;

        let mut staged: Vec<DatasetEntry> = Vec::with_capacity(raw.len());
        for (identifier, spec) in raw {
            if identifier.trim().is_empty() {
                return Err(Error::Config("dataset identifier must not be empty".into()));
            }
            if self.index.contains_key(&identifier)
                || staged.iter().any(|e| e.identifier() == identifier)
            {
                return Err(Error::Config(format!(
                    "dataset '{identifier}' is registered more than once"
                )));
            }
            let spec = spec.validate(&identifier)?;
            staged.push(DatasetEntry::new(identifier, spec));
        }

        let added = staged.len();
        for entry in staged {
            self.insert(entry);
        }
        info!(added, total = self.len(), "Registered datasets");
        Ok(added)
    }

    /// Register a single entry.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the identifier is empty or already registered.
    pub fn register_entry(&mut self, entry: DatasetEntry) -> Result<()> {
        if entry.identifier().trim().is_empty() {
            return Err(Error::Config("dataset identifier must not be empty".into()));
        }
        if self.index.contains_key(entry.identifier()) {
            return Err(Error::Config(format!(
                "dataset '{}' is registered more than once",
                entry.identifier()
            )));
        }
        self.insert(entry);
        Ok(())
    }

    fn insert(&mut self, entry: DatasetEntry) {
        let entry = entry.rebased(&self.base_dir);
        debug!(dataset = entry.identifier(), spec = ?entry.spec(), "Registered dataset");
        self.index
            .insert(entry.identifier().to_string(), self.entries.len());
        self.entries.push(entry);
    }

    /// Look up a registered dataset.
    ///
    /// # Errors
    ///
    /// Returns `UnknownDataset` if the identifier is not registered.
    pub fn resolve(&self, identifier: &str) -> Result<&DatasetEntry> {
        self.index
            .get(identifier)
            .map(|&idx| &self.entries[idx])
            .ok_or_else(|| Error::UnknownDataset(identifier.to_string()))
    }

    /// Read a dataset from disk and normalize it.
    ///
    /// Every call re-reads the files, so edits between runs are picked up.
    ///
    /// # Errors
    ///
    /// `UnknownDataset`, `Io`, `DataFormat`, or `LabelFormat`.
    pub fn load(&self, identifier: &str) -> Result<LoadedDataset> {
        let entry = self.resolve(identifier)?;
        loader::load_spec(entry.spec(), self.delimiter)
    }
}

/// One entry of the configuration file before validation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSpec {
    data: Option<PathBuf>,
    labels: Option<PathBuf>,
    dataset: Option<PathBuf>,
    labels_format: Option<LabelLayout>,
}

impl RawSpec {
    fn validate(self, identifier: &str) -> Result<DatasetSpec> {
        match (self.data, self.labels, self.dataset) {
            (Some(data_path), Some(labels_path), None) => Ok(DatasetSpec::TwoFile {
                data_path,
                labels_path,
                label_layout: self.labels_format.unwrap_or_default(),
            }),
            (None, None, Some(path)) => {
                if self.labels_format.is_some() {
                    return Err(Error::Config(format!(
                        "dataset '{identifier}': labels_format only applies to data/labels entries"
                    )));
                }
                Ok(DatasetSpec::Combined { path })
            }
            (None, None, None) => Err(Error::Config(format!(
                "dataset '{identifier}' supplies neither {{data, labels}} nor dataset"
            ))),
            (_, _, Some(_)) => Err(Error::Config(format!(
                "dataset '{identifier}' supplies both {{data, labels}} and dataset"
            ))),
            (Some(_), None, None) | (None, Some(_), None) => Err(Error::Config(format!(
                "dataset '{identifier}' must supply both data and labels"
            ))),
        }
    }
}

/// Configuration entries in file order, duplicates preserved.
///
/// A plain map would silently keep only the last of two equal keys.
struct ConfigEntries(Vec<(String, RawSpec)>);

impl<'de> Deserialize<'de> for ConfigEntries {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = ConfigEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map from dataset identifier to file locations")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, RawSpec>()? {
                    entries.push((key, value));
                }
                Ok(ConfigEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}
