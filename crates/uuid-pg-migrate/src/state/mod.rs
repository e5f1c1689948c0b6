//! Run lifecycle.
//!
//! A run moves through `Idle -> Connecting -> Loading(table)... -> Reporting
//! -> Done`. A failure to reach the stores moves it to `Failed` instead.
//! Nothing is persisted: a new run starts from `Idle` and re-derives
//! everything from the stores.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// Where a run currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Connecting,
    /// Loading the table at `position` (0-based) of a plan of `total` tables.
    Loading {
        table: String,
        position: usize,
        total: usize,
    },
    Reporting,
    Done,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed)
    }

    /// Whether `next` may follow `self`.
    pub fn can_transition_to(&self, next: &RunPhase) -> bool {
        use RunPhase::*;
        match (self, next) {
            (Idle, Connecting) => true,
            (Connecting, Loading { position: 0, .. }) | (Connecting, Reporting) => true,
            (Loading { position: a, .. }, Loading { position: b, .. }) => *b == *a + 1,
            (Loading { .. }, Reporting) => true,
            (Reporting, Done) => true,
            (current, Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Idle => f.write_str("idle"),
            RunPhase::Connecting => f.write_str("connecting"),
            RunPhase::Loading {
                table,
                position,
                total,
            } => write!(f, "loading {} ({}/{})", table, position + 1, total),
            RunPhase::Reporting => f.write_str("reporting"),
            RunPhase::Done => f.write_str("done"),
            RunPhase::Failed => f.write_str("failed"),
        }
    }
}

/// Phase tracker that rejects out-of-order transitions.
#[derive(Debug, Clone)]
pub struct RunState {
    phase: RunPhase,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            phase: RunPhase::Idle,
        }
    }
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &RunPhase {
        &self.phase
    }

    /// Move to `next`.
    pub fn advance(&mut self, next: RunPhase) -> Result<()> {
        if !self.phase.can_transition_to(&next) {
            return Err(MigrateError::InvalidTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        self.phase = next;
        Ok(())
    }

    /// Move to `Failed` from wherever the run is.
    pub fn fail(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = RunPhase::Failed;
        }
    }
}

/// Overall outcome of a run that reached the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every table in the plan was attempted.
    Completed,
    /// A source failure stopped the run under the `abort_run` policy.
    Aborted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Aborted => "aborted",
        }
    }
}

/// Outcome of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// Every record loaded.
    Completed,
    /// All records attempted, some failed.
    Partial,
    /// The source could not deliver the table.
    Skipped,
    /// A conflicting identifier mapping stopped the table early.
    Aborted,
    /// An earlier source failure stopped the run first.
    NotAttempted,
}

impl TableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Completed => "completed",
            TableStatus::Partial => "partial",
            TableStatus::Skipped => "skipped",
            TableStatus::Aborted => "aborted",
            TableStatus::NotAttempted => "not_attempted",
        }
    }
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loading(table: &str, position: usize) -> RunPhase {
        RunPhase::Loading {
            table: table.to_string(),
            position,
            total: 2,
        }
    }

    #[test]
    fn test_happy_path() {
        let mut state = RunState::new();
        state.advance(RunPhase::Connecting).unwrap();
        state.advance(loading("users", 0)).unwrap();
        state.advance(loading("orders", 1)).unwrap();
        state.advance(RunPhase::Reporting).unwrap();
        state.advance(RunPhase::Done).unwrap();
        assert!(state.phase().is_terminal());
    }

    #[test]
    fn test_tables_cannot_be_skipped_or_repeated() {
        let mut state = RunState::new();
        state.advance(RunPhase::Connecting).unwrap();
        assert!(state.advance(loading("orders", 1)).is_err());
        state.advance(loading("users", 0)).unwrap();
        assert!(state.advance(loading("users", 0)).is_err());
    }

    #[test]
    fn test_connecting_can_fail() {
        let mut state = RunState::new();
        state.advance(RunPhase::Connecting).unwrap();
        state.fail();
        assert_eq!(state.phase(), &RunPhase::Failed);
        assert!(state.advance(RunPhase::Reporting).is_err());
    }

    #[test]
    fn test_idle_cannot_load() {
        let mut state = RunState::new();
        let err = state.advance(loading("users", 0)).unwrap_err();
        assert!(err.to_string().contains("idle"));
    }

    #[test]
    fn test_done_is_final() {
        assert!(!RunPhase::Done.can_transition_to(&RunPhase::Failed));
        assert!(!RunPhase::Done.can_transition_to(&RunPhase::Connecting));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(loading("users", 0).to_string(), "loading users (1/2)");
        assert_eq!(TableStatus::NotAttempted.to_string(), "not_attempted");
    }
}
