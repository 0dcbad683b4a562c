//! Algorithm Set - the algorithms evaluated in one run

use std::collections::HashSet;
use std::sync::Arc;

use super::AlgorithmDescriptor;
use crate::{Error, Result};

/// Ordered collection of algorithms with unique names.
///
/// Names are checked on registration so a clash fails before any trial runs.
#[derive(Debug, Clone, Default)]
pub struct AlgorithmSet {
    algorithms: Vec<Arc<AlgorithmDescriptor>>,
    names: HashSet<String>,
}

impl AlgorithmSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from descriptors, in order.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateAlgorithm` on the first repeated name.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = AlgorithmDescriptor>,
    ) -> Result<Self> {
        let mut set = Self::new();
        for descriptor in descriptors {
            set.register(descriptor)?;
        }
        Ok(set)
    }

    /// Add an algorithm.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateAlgorithm` if the name is already taken.
    pub fn register(&mut self, descriptor: AlgorithmDescriptor) -> Result<()> {
        if !self.names.insert(descriptor.name().to_string()) {
            return Err(Error::DuplicateAlgorithm(descriptor.name().to_string()));
        }
        self.algorithms.push(Arc::new(descriptor));
        Ok(())
    }

    /// Look up an algorithm by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<AlgorithmDescriptor>> {
        self.algorithms.iter().find(|a| a.name() == name)
    }

    /// Iterate in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<AlgorithmDescriptor>> {
        self.algorithms.iter()
    }

    /// Algorithm names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.algorithms.iter().map(|a| a.name()).collect()
    }

    /// Number of algorithms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.algorithms.len()
    }

    /// Check if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.algorithms.is_empty()
    }
}
