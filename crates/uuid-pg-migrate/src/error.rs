//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, bad load plan, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source store could not deliver the records of a table.
    #[error("Source unavailable for table {table}: {message}")]
    SourceUnavailable { table: String, message: String },

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Same external id registered to two different surrogate keys in one run.
    #[error(
        "Conflicting mapping for {scope}:{external_id}: already registered to {existing}, refusing {attempted}"
    )]
    ConflictingMapping {
        scope: String,
        external_id: String,
        existing: i64,
        attempted: i64,
    },

    /// The run was driven through its phases out of order.
    #[error("Invalid run transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// A single row was rejected by the target store.
    #[error(transparent)]
    RowLoad(#[from] RowLoadError),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a SourceUnavailable error
    pub fn source_unavailable(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MigrateError::SourceUnavailable {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error means the session with a store could not be established.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, MigrateError::Pool { .. } | MigrateError::Target(_))
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Classification of a row rejected by the target store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowErrorKind {
    NotNull,
    ForeignKey,
    TypeMismatch,
    UniqueViolation,
    MissingNaturalKey,
    Constraint,
    Other,
}

impl RowErrorKind {
    /// Map a PostgreSQL SQLSTATE code to a row error kind.
    pub fn from_sqlstate(code: &str) -> Self {
        match code {
            "23502" => Self::NotNull,
            "23503" => Self::ForeignKey,
            "23505" => Self::UniqueViolation,
            "22P02" | "42804" | "22003" | "22007" | "22008" | "22023" => Self::TypeMismatch,
            c if c.starts_with("23") => Self::Constraint,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotNull => "not_null",
            Self::ForeignKey => "foreign_key",
            Self::TypeMismatch => "type_mismatch",
            Self::UniqueViolation => "unique_violation",
            Self::MissingNaturalKey => "missing_natural_key",
            Self::Constraint => "constraint",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for RowErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single row failed to load. Recovered locally by the loader.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Row load failed for {table} [{natural_key}] ({kind}): {message}")]
pub struct RowLoadError {
    /// Target table name.
    pub table: String,
    /// Best-effort description of the row's natural key.
    pub natural_key: String,
    /// What kind of constraint the row violated.
    pub kind: RowErrorKind,
    /// Underlying message from the target store.
    pub message: String,
}

impl RowLoadError {
    pub fn new(
        table: impl Into<String>,
        natural_key: impl Into<String>,
        kind: RowErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            natural_key: natural_key.into(),
            kind,
            message: message.into(),
        }
    }

    /// Classify a PostgreSQL error raised while upserting a row.
    pub fn from_pg(
        table: impl Into<String>,
        natural_key: impl Into<String>,
        err: &tokio_postgres::Error,
    ) -> Self {
        let (kind, message) = match err.as_db_error() {
            Some(db) => (
                RowErrorKind::from_sqlstate(db.code().code()),
                db.message().to_string(),
            ),
            None => (RowErrorKind::Other, err.to_string()),
        };
        Self::new(table, natural_key, kind, message)
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
