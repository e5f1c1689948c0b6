//! # uuid-pg-migrate
//!
//! Referential data migration from a UUID-keyed store into PostgreSQL tables
//! keyed by integer surrogates.
//!
//! Source records identify each other by external ids (UUIDs or other text).
//! The target assigns its own integer keys. This library loads tables in
//! foreign-key dependency order, remembers which surrogate key each external
//! id received, and rewrites foreign keys of later tables accordingly:
//!
//! - **Dependency-ordered loading** computed from the table descriptions
//! - **Idempotent upserts** on each table's natural key
//! - **Row isolation**: a rejected row is counted, never fatal
//! - **Dry runs** against an in-memory target
//!
//! ## Example
//!
//! ```rust,no_run
//! use uuid_pg_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> uuid_pg_migrate::Result<()> {
//!     let config = Config::load("migrate.yaml")?;
//!     let report = Orchestrator::new(config)?.run().await?;
//!     println!("{}", report.render_text());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod pg;
pub mod report;
pub mod source;
pub mod state;
pub mod target;
pub mod transform;
pub mod translate;

// Re-exports for convenient access
pub use config::{
    Config, MigrationConfig, SourceConfig, SourceFailurePolicy, TargetConfig, UpdatePolicy,
};
pub use crate::core::{
    ExternalRecord, LoadPlan, SourceReader, SqlValue, SurrogateKey, TableSpec, TargetRow,
    TargetWriter,
};
pub use error::{MigrateError, Result, RowErrorKind, RowLoadError};
pub use orchestrator::{HealthCheckResult, Orchestrator};
pub use report::{MigrationReport, TableResult};
pub use source::{JsonDirSource, MemorySource, PgSource};
pub use state::{RunPhase, RunStatus, TableStatus};
pub use target::{MemoryTarget, PgTarget};
pub use translate::{MappingEntry, Translator};
