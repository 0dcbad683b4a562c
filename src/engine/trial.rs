//! Per-trial state machine
//!
//! ```text
//! Pending ─▶ Loading ─▶ Running ─▶ Scoring ─▶ Done
//!               │          │
//!               └──────────┴──▶ Error
//! ```
//!
//! `Done` and `Error` are terminal. Every trial ends in exactly one of them
//! and produces exactly one results row.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::results::TrialKey;

/// Lifecycle state of one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialState {
    /// Planned, not started
    Pending,
    /// Dataset being loaded
    Loading,
    /// Algorithm callable executing
    Running,
    /// Predictions being prepared and scored
    Scoring,
    /// Success row recorded
    Done,
    /// Failure row recorded
    Error,
}

impl TrialState {
    /// Check whether `self → next` is a legal transition.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Loading)
                | (Self::Loading, Self::Running | Self::Error)
                | (Self::Running, Self::Scoring | Self::Error)
                | (Self::Scoring, Self::Done)
        )
    }

    /// Check whether the state is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl fmt::Display for TrialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Loading => "loading",
            Self::Running => "running",
            Self::Scoring => "scoring",
            Self::Done => "done",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// One (dataset, algorithm) evaluation, its current state, and its
/// execution log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trial {
    key: TrialKey,
    state: TrialState,
    log: Vec<(DateTime<Utc>, String)>,
}

impl Trial {
    /// Create a pending trial.
    #[must_use]
    pub fn new(key: TrialKey) -> Self {
        let mut trial = Self {
            key,
            state: TrialState::Pending,
            log: Vec::new(),
        };
        trial.note(TrialState::Pending.to_string());
        trial
    }

    /// Get the trial key.
    #[must_use]
    pub const fn key(&self) -> &TrialKey {
        &self.key
    }

    /// Get the current state.
    #[must_use]
    pub const fn state(&self) -> TrialState {
        self.state
    }

    /// Move to `next`.
    ///
    /// Returns `false` and leaves the state unchanged if the transition is
    /// not legal.
    pub fn advance(&mut self, next: TrialState) -> bool {
        if self.state.can_advance_to(next) {
            tracing::trace!(trial = %self.key, from = %self.state, to = %next, "Trial state");
            self.state = next;
            self.note(next.to_string());
            true
        } else {
            false
        }
    }
}

impl Trial {
    /// Append a line to the execution log.
    pub fn note(&mut self, message: impl Into<String>) {
        self.log.push((Utc::now(), message.into()));
    }

    /// Execution log lines, oldest first, each prefixed with an RFC 3339
    /// timestamp.
    #[must_use]
    pub fn execution_log(&self) -> Vec<String> {
        self.log
            .iter()
            .map(|(at, message)| {
                format!("{} {message}", at.to_rfc3339_opts(SecondsFormat::Millis, true))
            })
            .collect()
    }
}
