//! Directory of JSON exports.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::records_from_json;
use crate::core::{ExternalRecord, SourceReader};
use crate::error::{MigrateError, Result};

/// Reads `<dir>/<table>.json` for each table.
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.json", table))
    }
}

#[async_trait]
impl SourceReader for JsonDirSource {
    async fn fetch(&self, table: &str) -> Result<Vec<ExternalRecord>> {
        let path = self.path_for(table);
        let unavailable = |e: &dyn std::fmt::Display| {
            MigrateError::source_unavailable(table, format!("{}: {}", path.display(), e))
        };

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| unavailable(&e))?;
        let doc = serde_json::from_str(&content).map_err(|e| unavailable(&e))?;
        let records = records_from_json(table, doc)?;
        debug!("{}: read {} records from {}", table, records.len(), path.display());
        Ok(records)
    }

    async fn health_check(&self) -> Result<()> {
        let meta = tokio::fs::metadata(&self.dir).await?;
        if !meta.is_dir() {
            return Err(MigrateError::Config(format!(
                "source.dir '{}' is not a directory",
                self.dir.display()
            )));
        }
        Ok(())
    }

    fn source_type(&self) -> &str {
        "json_dir"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlValue;

    #[tokio::test]
    async fn test_fetch_reads_table_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("users.json"),
            r#"[{"id": "uuid-A", "email": "a@example.com", "age": 31}]"#,
        )
        .unwrap();

        let source = JsonDirSource::new(dir.path());
        let records = source.fetch("users").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("age"), Some(&SqlValue::Int(31)));
        assert!(source.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_file_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonDirSource::new(dir.path());
        let err = source.fetch("orders").await.unwrap_err();
        assert!(matches!(err, MigrateError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_malformed_json_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("orders.json"), "[{").unwrap();
        let source = JsonDirSource::new(dir.path());
        let err = source.fetch("orders").await.unwrap_err();
        assert!(matches!(err, MigrateError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_health_check_missing_dir() {
        let source = JsonDirSource::new("/nonexistent/export");
        assert!(source.health_check().await.is_err());
    }
}
