//! PostgreSQL source database operations.
//!
//! Rows are read as `to_jsonb(t)`, so every column arrives with its JSON
//! representation and the reader needs no per-type conversion.

use async_trait::async_trait;
use deadpool_postgres::Pool;
use serde_json::Value as JsonValue;
use tracing::debug;

use super::records_from_json;
use crate::config::SourceConfig;
use crate::core::identifier::qualify_pg;
use crate::core::{ExternalRecord, SourceReader};
use crate::error::{MigrateError, Result};
use crate::pg;

/// PostgreSQL source.
pub struct PgSource {
    pool: Pool,
    schema: String,
}

impl PgSource {
    /// Connect to the source database.
    pub async fn new(config: &SourceConfig) -> Result<Self> {
        let params = config.connection_params()?;
        let pool = pg::connect(&params, 1, "source").await?;
        Ok(Self {
            pool,
            schema: config.schema.clone(),
        })
    }
}

#[async_trait]
impl SourceReader for PgSource {
    async fn fetch(&self, table: &str) -> Result<Vec<ExternalRecord>> {
        let query = format!("SELECT to_jsonb(t) FROM {} AS t", qualify_pg(&self.schema, table)?);
        let client = pg::checkout(&self.pool, "source")
            .await
            .map_err(|e| MigrateError::source_unavailable(table, e))?;
        let rows = client
            .query(query.as_str(), &[])
            .await
            .map_err(|e| MigrateError::source_unavailable(table, e))?;

        let docs: Vec<JsonValue> = rows.iter().map(|r| r.get::<_, JsonValue>(0)).collect();
        debug!("{}.{}: read {} rows", self.schema, table, docs.len());
        records_from_json(table, JsonValue::Array(docs))
    }

    async fn health_check(&self) -> Result<()> {
        let client = pg::checkout(&self.pool, "source").await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    fn source_type(&self) -> &str {
        "postgres"
    }
}
