//! Dataset Registry
//!
//! Resolves dataset identifiers to files and loads the heterogeneous on-disk
//! layouts into one aligned in-memory shape.
//!
//! ## Layouts
//!
//! ```text
//! TwoFile:   data.csv  (one row per step)  +  labels.csv (dense 0/1 or sparse indices)
//! Combined:  dataset.csv  (value columns..., label)
//!                 │
//!                 ▼
//!          LoadedDataset { values: Vec<Vec<f64>>, labels: Vec<u8> }
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tsad_eval::dataset::DatasetRegistry;
//!
//! let mut registry = DatasetRegistry::new("data");
//! registry.register_file("data/datasets.json")?;
//!
//! let dataset = registry.load("d1")?;
//! assert_eq!(dataset.values().len(), dataset.labels().len());
//! # Ok::<(), tsad_eval::Error>(())
//! ```

mod entry;
mod loaded;
mod loader;
mod registry;

pub use entry::{DatasetEntry, DatasetSpec, LabelLayout};
pub use loaded::{DatasetSummary, LoadedDataset};
pub use registry::{DatasetRegistry, DEFAULT_DELIMITER};
