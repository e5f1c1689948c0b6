//! Collaborator traits for the migration engine.
//!
//! - [`SourceReader`]: delivers the records of one source table
//! - [`TargetWriter`]: idempotent upsert of one row into the target store
//!
//! The orchestrator only talks to these traits, so the whole load can run
//! against in-memory implementations in tests and in dry-run mode.

use async_trait::async_trait;

use crate::error::{Result, RowLoadError};

use super::schema::TableSpec;
use super::value::{ExternalRecord, SurrogateKey, TargetRow};

/// Read records from a source store.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Fetch every record of a source table.
    ///
    /// Fails with [`MigrateError::SourceUnavailable`](crate::MigrateError::SourceUnavailable)
    /// when the table cannot be read.
    async fn fetch(&self, table: &str) -> Result<Vec<ExternalRecord>>;

    /// Check that the source can be reached.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    /// Get the source type identifier (e.g., "json_dir", "postgres").
    fn source_type(&self) -> &str;
}

/// Write rows to the target store.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Insert the row, or update the existing row with the same natural key.
    ///
    /// Only columns present in `row` are written; on conflict the existing
    /// row keeps its values for every omitted column. Returns the surrogate
    /// key of the inserted or existing row. Calling twice with the same row
    /// leaves one row with identical values.
    async fn upsert(
        &self,
        spec: &TableSpec,
        row: &TargetRow,
    ) -> std::result::Result<SurrogateKey, RowLoadError>;

    /// Find the surrogate key of the row matching `row` on the natural key.
    async fn lookup(&self, spec: &TableSpec, row: &TargetRow) -> Result<Option<SurrogateKey>>;

    /// Check that the target can be reached.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    /// Get the database type identifier (e.g., "postgres", "memory").
    fn db_type(&self) -> &str;

    /// Release the session.
    async fn close(&self);
}
