//! In-memory target used for dry runs and tests.
//!
//! Follows the same write path as the PostgreSQL target: a row is looked up
//! by natural key, an existing row gets only the provided columns assigned
//! (NOT NULL is checked on the result), and a new row is inserted with the
//! next key, starting at 1 per table. NOT NULL columns can be declared to
//! reproduce row-level rejections.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

use super::check_natural_key;
use crate::config::UpdatePolicy;
use crate::core::{SqlValue, SurrogateKey, TableSpec, TargetRow, TargetWriter};
use crate::error::{Result, RowErrorKind, RowLoadError};

#[derive(Debug, Default)]
struct MemTable {
    rows: Vec<(SurrogateKey, TargetRow)>,
    last_id: i64,
    /// Natural key the index is built on.
    key_columns: Vec<String>,
    /// Natural-key value to row position.
    index: HashMap<String, usize>,
}

/// Index key of a row: its natural-key values as a JSON array. `None` when a
/// key column is missing or NULL, since such a row can never match.
fn index_key(columns: &[String], row: &TargetRow) -> Option<String> {
    columns
        .iter()
        .map(|c| row.get(c).filter(|v| !v.is_null()).map(SqlValue::to_json))
        .collect::<Option<Vec<_>>>()
        .map(|values| JsonValue::Array(values).to_string())
}

impl MemTable {
    /// Rebuild the index when a spec names a different natural key.
    fn index_on(&mut self, spec: &TableSpec) {
        if self.key_columns == spec.natural_key {
            return;
        }
        let mut index = HashMap::with_capacity(self.rows.len());
        for (pos, (_, row)) in self.rows.iter().enumerate() {
            if let Some(k) = index_key(&spec.natural_key, row) {
                index.entry(k).or_insert(pos);
            }
        }
        self.key_columns = spec.natural_key.clone();
        self.index = index;
    }

    fn position(&mut self, spec: &TableSpec, row: &TargetRow) -> Option<usize> {
        self.index_on(spec);
        let key = index_key(&self.key_columns, row)?;
        self.index.get(&key).copied()
    }

    fn push(&mut self, key: SurrogateKey, row: TargetRow) {
        if !self.key_columns.is_empty() {
            if let Some(k) = index_key(&self.key_columns, &row) {
                self.index.entry(k).or_insert(self.rows.len());
            }
        }
        self.rows.push((key, row));
    }

    fn next_key(&mut self) -> Option<SurrogateKey> {
        self.last_id += 1;
        SurrogateKey::new(self.last_id)
    }
}

/// Target store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    tables: Mutex<HashMap<String, MemTable>>,
    not_null: HashMap<String, HashSet<String>>,
    update_policy: UpdatePolicy,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_update_policy(mut self, policy: UpdatePolicy) -> Self {
        self.update_policy = policy;
        self
    }

    /// Declare `column` of `table` as NOT NULL.
    pub fn with_not_null(mut self, table: &str, column: &str) -> Self {
        self.not_null
            .entry(table.to_string())
            .or_default()
            .insert(column.to_string());
        self
    }

    /// Insert a row directly, as if it existed before the run.
    pub async fn seed(&self, table: &str, row: TargetRow) -> Option<SurrogateKey> {
        let mut tables = self.tables.lock().await;
        let t = tables.entry(table.to_string()).or_default();
        let key = t.next_key()?;
        t.push(key, row);
        Some(key)
    }

    /// Rows of a table in insertion order.
    pub async fn rows(&self, table: &str) -> Vec<(SurrogateKey, TargetRow)> {
        self.tables
            .lock()
            .await
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub async fn row_count(&self, table: &str) -> usize {
        self.tables
            .lock()
            .await
            .get(table)
            .map_or(0, |t| t.rows.len())
    }

    fn check_not_null(
        &self,
        spec: &TableSpec,
        row: &TargetRow,
    ) -> std::result::Result<(), RowLoadError> {
        let Some(columns) = self.not_null.get(&spec.name) else {
            return Ok(());
        };
        let mut violated: Vec<&String> = columns
            .iter()
            .filter(|c| row.get(c).map_or(true, SqlValue::is_null))
            .collect();
        violated.sort();
        match violated.first() {
            None => Ok(()),
            Some(column) => Err(RowLoadError::new(
                &spec.name,
                row.describe_key(&spec.natural_key),
                RowErrorKind::NotNull,
                format!(
                    "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                    column, spec.name
                ),
            )),
        }
    }
}

#[async_trait]
impl TargetWriter for MemoryTarget {
    async fn upsert(
        &self,
        spec: &TableSpec,
        row: &TargetRow,
    ) -> std::result::Result<SurrogateKey, RowLoadError> {
        check_natural_key(spec, row)?;

        let mut tables = self.tables.lock().await;
        let table = tables.entry(spec.name.clone()).or_default();

        if let Some(pos) = table.position(spec, row) {
            let (key, existing) = &table.rows[pos];
            if self.update_policy == UpdatePolicy::InsertOnly {
                return Ok(*key);
            }
            let mut merged = existing.clone();
            for (column, value) in row.iter() {
                merged.insert(column.clone(), value.clone());
            }
            self.check_not_null(spec, &merged)?;
            let key = *key;
            table.rows[pos].1 = merged;
            return Ok(key);
        }

        self.check_not_null(spec, row)?;
        let key = table.next_key().ok_or_else(|| {
            RowLoadError::new(
                &spec.name,
                row.describe_key(&spec.natural_key),
                RowErrorKind::Other,
                "surrogate key sequence exhausted",
            )
        })?;
        table.push(key, row.clone());
        Ok(key)
    }

    async fn lookup(&self, spec: &TableSpec, row: &TargetRow) -> Result<Option<SurrogateKey>> {
        let mut tables = self.tables.lock().await;
        Ok(tables
            .get_mut(&spec.name)
            .and_then(|t| t.position(spec, row).map(|pos| t.rows[pos].0)))
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}
