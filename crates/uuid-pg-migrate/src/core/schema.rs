//! Per-table load descriptions.
//!
//! A [`TableSpec`] says how records of one source table map onto a target
//! table: which columns form the natural key used for conflict detection,
//! which fields carry foreign-key external ids, and whether the table
//! produces identities that later tables refer to.

use serde::{Deserialize, Serialize};

/// Marks a table whose rows produce surrogate keys other tables refer to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySpec {
    /// Logical entity the external ids belong to (e.g. "user").
    pub scope: String,

    /// Source field holding the external id (default: "id").
    #[serde(default = "default_id_field")]
    pub id_field: String,
}

/// A source field holding an external id of another entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeySpec {
    /// Column name, identical in the source record and the target row.
    pub column: String,

    /// Scope of the referenced entity.
    pub scope: String,
}

/// How one source table is loaded into its target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Target table name.
    pub name: String,

    /// Source table/collection name when it differs from the target name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,

    /// Columns of the unique constraint used to detect an existing row.
    #[serde(default)]
    pub natural_key: Vec<String>,

    /// Integer key column returned by the upsert (default: "id").
    #[serde(default = "default_surrogate_key")]
    pub surrogate_key: String,

    /// Present when this table produces identities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentitySpec>,

    /// Target column that keeps the external id text, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id_column: Option<String>,

    /// Foreign-key fields rewritten through the translator.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeySpec>,

    /// Source fields with no target column (embedded relations and the like).
    #[serde(default)]
    pub drop_fields: Vec<String>,

    /// Optional allow-list of target columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
}

impl TableSpec {
    /// Minimal spec with a natural key; the rest is filled in with builders.
    pub fn new(name: impl Into<String>, natural_key: &[&str]) -> Self {
        Self {
            name: name.into(),
            source_name: None,
            natural_key: natural_key.iter().map(|s| s.to_string()).collect(),
            surrogate_key: default_surrogate_key(),
            identity: None,
            external_id_column: None,
            foreign_keys: Vec::new(),
            drop_fields: Vec::new(),
            columns: None,
        }
    }

    pub fn with_identity(mut self, scope: impl Into<String>) -> Self {
        self.identity = Some(IdentitySpec {
            scope: scope.into(),
            id_field: default_id_field(),
        });
        self
    }

    pub fn with_foreign_key(mut self, column: impl Into<String>, scope: impl Into<String>) -> Self {
        self.foreign_keys.push(ForeignKeySpec {
            column: column.into(),
            scope: scope.into(),
        });
        self
    }

    pub fn with_drop_field(mut self, field: impl Into<String>) -> Self {
        self.drop_fields.push(field.into());
        self
    }

    pub fn with_external_id_column(mut self, column: impl Into<String>) -> Self {
        self.external_id_column = Some(column.into());
        self
    }

    /// Name to fetch from the source store.
    pub fn source_table(&self) -> &str {
        self.source_name.as_deref().unwrap_or(&self.name)
    }

    /// Scopes this table refers to, excluding its own identity scope.
    pub fn referenced_scopes(&self) -> impl Iterator<Item = &str> {
        let own = self.identity.as_ref().map(|i| i.scope.as_str());
        self.foreign_keys
            .iter()
            .map(|fk| fk.scope.as_str())
            .filter(move |scope| Some(*scope) != own)
    }

    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKeySpec> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }

    pub fn is_natural_key(&self, column: &str) -> bool {
        self.natural_key.iter().any(|c| c == column)
    }
}

fn default_surrogate_key() -> String {
    "id".to_string()
}

fn default_id_field() -> String {
    "id".to_string()
}
