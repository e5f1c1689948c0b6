//! Records held in memory.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::core::{ExternalRecord, SourceReader};
use crate::error::{MigrateError, Result};

/// Source backed by fixed per-table record lists.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    tables: HashMap<String, Vec<ExternalRecord>>,
    unavailable: HashSet<String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: &str, records: Vec<ExternalRecord>) -> Self {
        self.tables.insert(table.to_string(), records);
        self
    }

    /// Make `fetch(table)` fail as if the store could not be read.
    pub fn with_unavailable(mut self, table: &str) -> Self {
        self.unavailable.insert(table.to_string());
        self
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn fetch(&self, table: &str) -> Result<Vec<ExternalRecord>> {
        if self.unavailable.contains(table) {
            return Err(MigrateError::source_unavailable(table, "store unavailable"));
        }
        self.tables
            .get(table)
            .cloned()
            .ok_or_else(|| MigrateError::source_unavailable(table, "no such table"))
    }

    fn source_type(&self) -> &str {
        "memory"
    }
}
