//! Migration report.
//!
//! Built by the orchestrator while the run progresses and handed back when
//! it ends. Rendering has no side effects; the CLI decides where output goes.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RowErrorKind, RowLoadError};
use crate::state::{RunStatus, TableStatus};
use crate::translate::MappingEntry;

/// One retained row failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFailure {
    /// Natural key of the failed row, as `col=value` pairs.
    pub natural_key: String,
    pub kind: RowErrorKind,
    pub message: String,
}

impl From<&RowLoadError> for RowFailure {
    fn from(err: &RowLoadError) -> Self {
        Self {
            natural_key: err.natural_key.clone(),
            kind: err.kind,
            message: err.message.clone(),
        }
    }
}

/// Outcome counts for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableResult {
    pub table: String,
    pub status: TableStatus,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Foreign-key values written as NULL because they did not resolve.
    pub unresolved_references: usize,
    /// The first failures of the table, up to the configured limit.
    pub failures: Vec<RowFailure>,
    /// Why the table was skipped or stopped early.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableResult {
    /// Empty result for a table about to load.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            status: TableStatus::Completed,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            unresolved_references: 0,
            failures: Vec::new(),
            error: None,
        }
    }

    pub fn skipped(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: TableStatus::Skipped,
            error: Some(reason.into()),
            ..Self::new(table)
        }
    }

    pub fn not_attempted(table: impl Into<String>) -> Self {
        Self {
            status: TableStatus::NotAttempted,
            ..Self::new(table)
        }
    }

    pub fn record_success(&mut self, unresolved: usize) {
        self.attempted += 1;
        self.succeeded += 1;
        self.unresolved_references += unresolved;
    }

    /// Count a failed row and keep its details while fewer than
    /// `max_samples` are retained.
    pub fn record_failure(&mut self, err: &RowLoadError, unresolved: usize, max_samples: usize) {
        self.attempted += 1;
        self.failed += 1;
        self.unresolved_references += unresolved;
        if self.failures.len() < max_samples {
            self.failures.push(RowFailure::from(err));
        }
    }

    /// Stop the table early; rows not yet attempted stay uncounted.
    pub fn abort(&mut self, reason: impl Into<String>) {
        self.status = TableStatus::Aborted;
        self.error = Some(reason.into());
    }

    /// Settle the status once every row has been attempted.
    pub fn finish(&mut self) {
        if self.status == TableStatus::Completed && self.failed > 0 {
            self.status = TableStatus::Partial;
        }
    }
}

/// Result of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: RunStatus,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Rows were written to an in-memory target only.
    pub dry_run: bool,

    /// Per-table results in load order.
    pub tables: Vec<TableResult>,

    /// Identifier mapping at the end of the run.
    pub mapping: Vec<MappingEntry>,
}

impl MigrationReport {
    pub fn total_attempted(&self) -> usize {
        self.tables.iter().map(|t| t.attempted).sum()
    }

    pub fn total_succeeded(&self) -> usize {
        self.tables.iter().map(|t| t.succeeded).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.tables.iter().map(|t| t.failed).sum()
    }

    pub fn total_unresolved(&self) -> usize {
        self.tables.iter().map(|t| t.unresolved_references).sum()
    }

    pub fn table(&self, name: &str) -> Option<&TableResult> {
        self.tables.iter().find(|t| t.table == name)
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable summary.
    pub fn render_text(&self) -> String {
        let width = self
            .tables
            .iter()
            .map(|t| t.table.len())
            .max()
            .unwrap_or(0)
            .max(5);
        let mut out = String::new();

        let title = if self.dry_run {
            "Migration report (dry run)"
        } else {
            "Migration report"
        };
        let _ = writeln!(out, "{}", title);
        let _ = writeln!(out, "  Run ID: {}", self.run_id);
        let _ = writeln!(out, "  Status: {}", self.status.as_str());
        let _ = writeln!(out, "  Duration: {:.2}s", self.duration_seconds);
        let _ = writeln!(out);

        let _ = writeln!(
            out,
            "  {:<width$}  {:<13}  {:>9}  {:>9}  {:>6}  {:>10}",
            "table",
            "status",
            "attempted",
            "succeeded",
            "failed",
            "unresolved",
            width = width
        );
        for t in &self.tables {
            let _ = writeln!(
                out,
                "  {:<width$}  {:<13}  {:>9}  {:>9}  {:>6}  {:>10}",
                t.table,
                t.status.as_str(),
                t.attempted,
                t.succeeded,
                t.failed,
                t.unresolved_references,
                width = width
            );
            if let Some(reason) = &t.error {
                let _ = writeln!(out, "      reason: {}", reason);
            }
            for f in &t.failures {
                let _ = writeln!(out, "      [{}] {}: {}", f.natural_key, f.kind, f.message);
            }
            let hidden = t.failed.saturating_sub(t.failures.len());
            if hidden > 0 {
                let _ = writeln!(out, "      ... and {} more", hidden);
            }
        }
        let _ = writeln!(
            out,
            "  {:<width$}  {:<13}  {:>9}  {:>9}  {:>6}  {:>10}",
            "total",
            "",
            self.total_attempted(),
            self.total_succeeded(),
            self.total_failed(),
            self.total_unresolved(),
            width = width
        );

        let _ = writeln!(out);
        let _ = writeln!(out, "Identifier mapping ({} entries)", self.mapping.len());
        for e in &self.mapping {
            let _ = writeln!(out, "  {}:{} -> {}", e.scope, e.external_id, e.surrogate_id);
        }
        out
    }
}
