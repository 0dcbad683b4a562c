//! Dataset Entry - registry record describing where a dataset lives on disk

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// How a labels file in the two-file layout should be interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelLayout {
    /// Dense when the row count matches the data, sparse indices otherwise.
    #[default]
    Auto,
    /// One binary flag per data row.
    Dense,
    /// A list of anomalous row indices.
    Sparse,
}

/// File layout of a registered dataset.
///
/// Validated once at registration so loading never has to sniff the shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum DatasetSpec {
    /// Separate data and labels files.
    TwoFile {
        /// Values, one row per time step
        data_path: PathBuf,
        /// Dense flags or sparse indices
        labels_path: PathBuf,
        /// Interpretation of the labels file
        #[serde(default)]
        label_layout: LabelLayout,
    },
    /// A single file whose last column is the label.
    Combined {
        /// Values followed by a trailing label column
        path: PathBuf,
    },
}

impl DatasetSpec {
    /// All files this dataset reads from.
    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            Self::TwoFile {
                data_path,
                labels_path,
                ..
            } => vec![data_path.as_path(), labels_path.as_path()],
            Self::Combined { path } => vec![path.as_path()],
        }
    }
}

/// A registered dataset: identifier plus resolved file locations.
///
/// Immutable once created by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    identifier: String,
    spec: DatasetSpec,
}

impl DatasetEntry {
    /// Create an entry for a two-file dataset with automatic label detection.
    #[must_use]
    pub fn two_file(
        identifier: impl Into<String>,
        data_path: impl Into<PathBuf>,
        labels_path: impl Into<PathBuf>,
    ) -> Self {
        Self::new(
            identifier,
            DatasetSpec::TwoFile {
                data_path: data_path.into(),
                labels_path: labels_path.into(),
                label_layout: LabelLayout::Auto,
            },
        )
    }

    /// Create an entry for a combined-file dataset.
    #[must_use]
    pub fn combined(identifier: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::new(identifier, DatasetSpec::Combined { path: path.into() })
    }

    /// Create an entry from an explicit spec.
    #[must_use]
    pub fn new(identifier: impl Into<String>, spec: DatasetSpec) -> Self {
        Self {
            identifier: identifier.into(),
            spec,
        }
    }

    /// Override how the labels file is interpreted (two-file layout only).
    #[must_use]
    pub fn with_label_layout(mut self, layout: LabelLayout) -> Self {
        if let DatasetSpec::TwoFile { label_layout, .. } = &mut self.spec {
            *label_layout = layout;
        }
        self
    }

    /// Get the dataset identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Get the file layout.
    #[must_use]
    pub const fn spec(&self) -> &DatasetSpec {
        &self.spec
    }

    /// Resolve relative paths against `base_dir`; absolute paths are kept.
    #[must_use]
    pub(crate) fn rebased(self, base_dir: &Path) -> Self {
        let rebase = |p: PathBuf| if p.is_absolute() { p } else { base_dir.join(p) };
        let spec = match self.spec {
            DatasetSpec::TwoFile {
                data_path,
                labels_path,
                label_layout,
            } => DatasetSpec::TwoFile {
                data_path: rebase(data_path),
                labels_path: rebase(labels_path),
                label_layout,
            },
            DatasetSpec::Combined { path } => DatasetSpec::Combined { path: rebase(path) },
        };
        Self {
            identifier: self.identifier,
            spec,
        }
    }
}
