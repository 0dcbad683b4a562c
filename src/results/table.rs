//! Results Table - keyed, ordered store of trial results
//!
//! Appends are keyed upserts backed by `DashMap`, so concurrent trials can
//! write without coordination and the final row order does not depend on
//! completion order.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use rustc_hash::FxHashMap;

use super::export::ResultsExport;
use super::{TrialKey, TrialResult, TrialStatus};

/// Column to group results by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    /// One group per algorithm name.
    Algorithm,
    /// One group per dataset identifier.
    Dataset,
}

/// Table of trial results, at most one row per [`TrialKey`].
///
/// A key's position is fixed the first time it is declared or appended;
/// appending the same key again replaces the row in place.
#[derive(Debug, Default)]
pub struct ResultsTable {
    rows: DashMap<TrialKey, TrialResult>,
    positions: DashMap<TrialKey, u64>,
    next_position: AtomicU64,
}

impl ResultsTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve row positions for `keys` in the given order.
    ///
    /// Keys that already have a position keep it.
    pub fn declare_order<'a>(&self, keys: impl IntoIterator<Item = &'a TrialKey>) {
        for key in keys {
            self.position_of(key);
        }
    }

    fn position_of(&self, key: &TrialKey) -> u64 {
        *self
            .positions
            .entry(key.clone())
            .or_insert_with(|| self.next_position.fetch_add(1, Ordering::Relaxed))
    }

    /// Insert or replace the row for `result.key()`.
    ///
    /// Returns `true` if an existing row was replaced.
    pub fn append(&self, result: TrialResult) -> bool {
        self.position_of(result.key());
        self.rows.insert(result.key().clone(), result).is_some()
    }

    /// Get a copy of the row for `key`.
    #[must_use]
    pub fn get(&self, key: &TrialKey) -> Option<TrialResult> {
        self.rows.get(key).map(|row| row.value().clone())
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows in table order.
    #[must_use]
    pub fn rows(&self) -> Vec<TrialResult> {
        let mut rows: Vec<(u64, TrialResult)> = self
            .rows
            .iter()
            .map(|row| {
                let position = self.positions.get(row.key()).map_or(u64::MAX, |p| *p);
                (position, row.value().clone())
            })
            .collect();
        rows.sort_by(|(pa, a), (pb, b)| pa.cmp(pb).then_with(|| a.key().cmp(b.key())));
        rows.into_iter().map(|(_, row)| row).collect()
    }

    /// Rows matching `predicate`, in table order.
    #[must_use]
    pub fn filter<P>(&self, mut predicate: P) -> Vec<TrialResult>
    where
        P: FnMut(&TrialResult) -> bool,
    {
        self.rows().into_iter().filter(|row| predicate(row)).collect()
    }

    /// Rows with the given status, in table order.
    #[must_use]
    pub fn with_status(&self, status: TrialStatus) -> Vec<TrialResult> {
        self.filter(|row| row.status() == status)
    }

    /// Rows grouped by algorithm or dataset.
    ///
    /// Groups appear in order of their first row; rows keep table order.
    #[must_use]
    pub fn group_by(&self, by: GroupBy) -> Vec<(String, Vec<TrialResult>)> {
        let mut groups: Vec<(String, Vec<TrialResult>)> = Vec::new();
        let mut index: FxHashMap<String, usize> = FxHashMap::default();

        for row in self.rows() {
            let name = match by {
                GroupBy::Algorithm => row.algorithm(),
                GroupBy::Dataset => row.dataset(),
            }
            .to_string();

            let slot = *index.entry(name.clone()).or_insert_with(|| {
                groups.push((name, Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(row);
        }

        groups
    }

    /// Tabular snapshot for serialization and downstream analysis.
    #[must_use]
    pub fn export(&self) -> ResultsExport {
        ResultsExport::from_rows(&self.rows())
    }
}
