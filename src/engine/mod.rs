//! Execution Engine
//!
//! Runs every configured algorithm against every configured dataset and
//! records one row per (dataset, algorithm) trial in a [`ResultsTable`].
//!
//! ## Trial Pipeline
//!
//! ```text
//! registry.load ─▶ descriptor.invoke ─▶ prepare_scores ─▶ MetricSet::evaluate
//!  (blocking)        (blocking, timeout)                    (per-metric isolation)
//!      │                   │
//!      ▼                   ▼
//! dataset_error      algorithm_error
//! ```
//!
//! A failing trial never stops the run. With `max_workers > 1` trials run
//! as concurrent tokio tasks bounded by a semaphore; rows still come out in
//! planned order.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tsad_eval::algorithm::{AlgorithmDescriptor, AlgorithmSet};
//! use tsad_eval::dataset::DatasetRegistry;
//! use tsad_eval::engine::{Engine, EngineConfig};
//!
//! # async fn demo() -> tsad_eval::Result<()> {
//! let mut registry = DatasetRegistry::new("data");
//! registry.register_file("data/datasets.json")?;
//!
//! let algorithms = AlgorithmSet::from_descriptors([AlgorithmDescriptor::from_array_fn(
//!     "zeros_like",
//!     |values| Ok(vec![0.0; values.len()]),
//! )?])?;
//!
//! let engine = Engine::builder()
//!     .registry(registry)
//!     .algorithms(algorithms)
//!     .config(EngineConfig::builder().max_workers(4).build()?)
//!     .build()?;
//!
//! let summary = engine.run().await?;
//! println!("{} of {} trials succeeded", summary.succeeded, summary.trials);
//! # Ok(())
//! # }
//! ```
//!
//! [`ResultsTable`]: crate::results::ResultsTable

mod config;
mod executor;
mod trial;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use executor::{Engine, EngineBuilder, RunSummary};
pub use trial::{Trial, TrialState};
