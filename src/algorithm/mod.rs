//! Algorithm Descriptors
//!
//! User-supplied detectors are opaque. A descriptor pairs one with a unique
//! name and an [`InputMode`] telling the engine whether to pass the loaded
//! values directly or through a temporary file.
//!
//! ## Usage
//!
//! ```rust
//! use tsad_eval::algorithm::{AlgorithmDescriptor, AlgorithmSet};
//!
//! let zeros = AlgorithmDescriptor::from_array_fn("zeros", |values| Ok(vec![0.0; values.len()]))?;
//! let from_file = AlgorithmDescriptor::from_file_fn("line-count", |path| {
//!     let rows = std::fs::read_to_string(path)?.lines().count();
//!     Ok(vec![0.0; rows])
//! })?;
//!
//! let algorithms = AlgorithmSet::from_descriptors([zeros, from_file])?;
//! assert_eq!(algorithms.names(), vec!["zeros", "line-count"]);
//! # Ok::<(), tsad_eval::Error>(())
//! ```

mod descriptor;
mod materialize;
mod set;

pub use descriptor::{Algorithm, AlgorithmDescriptor, AlgorithmInput, InputMode};
pub use set::AlgorithmSet;
