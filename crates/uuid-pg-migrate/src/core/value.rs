//! Schema-less value and row types.
//!
//! Source records arrive with whatever shape the source store gives them, so
//! rows are kept as ordered `field -> SqlValue` maps instead of per-table
//! structs. Ordering is by field name, which keeps generated SQL and test
//! output deterministic.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A single field value in a source record or target row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL / undefined.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Nested or structured JSON (objects and arrays).
    Json(JsonValue),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// NULL or an empty string. Blank fields are left out of the statement so
    /// the column default (or the existing value on update) applies.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            SqlValue::Null => true,
            SqlValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Textual form of a value used as an external identifier.
    ///
    /// Only scalar text and numbers can identify a row; booleans, floats
    /// with a fractional part and nested JSON cannot.
    #[must_use]
    pub fn as_external_id(&self) -> Option<String> {
        match self {
            SqlValue::Text(s) if !s.is_empty() => Some(s.clone()),
            SqlValue::Int(n) => Some(n.to_string()),
            SqlValue::Float(f) if f.fract() == 0.0 && f.is_finite() => {
                Some(format!("{}", *f as i64))
            }
            _ => None,
        }
    }

    /// Convert back into a JSON value.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            SqlValue::Null => JsonValue::Null,
            SqlValue::Bool(b) => JsonValue::Bool(*b),
            SqlValue::Int(n) => JsonValue::from(*n),
            SqlValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            SqlValue::Text(s) => JsonValue::String(s.clone()),
            SqlValue::Json(v) => v.clone(),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Int(n) => write!(f, "{}", n),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Text(s) => f.write_str(s),
            SqlValue::Json(v) => write!(f, "{}", v),
        }
    }
}

impl From<JsonValue> for SqlValue {
    fn from(v: JsonValue) -> Self {
        match v {
            JsonValue::Null => SqlValue::Null,
            JsonValue::Bool(b) => SqlValue::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Int(i),
                None => SqlValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => SqlValue::Text(s),
            other => SqlValue::Json(other),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<SurrogateKey> for SqlValue {
    fn from(v: SurrogateKey) -> Self {
        SqlValue::Int(v.get())
    }
}

/// Integer key assigned by the target store on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurrogateKey(i64);

impl SurrogateKey {
    /// Wrap a key returned by the target. Keys are positive; anything else
    /// is not a surrogate key.
    pub fn new(value: i64) -> Option<Self> {
        (value > 0).then_some(Self(value))
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for SurrogateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One source row, as received.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalRecord {
    fields: BTreeMap<String, SqlValue>,
}

impl ExternalRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON object. Returns `None` for non-objects.
    pub fn from_json(value: JsonValue) -> Option<Self> {
        match value {
            JsonValue::Object(map) => Some(
                map.into_iter()
                    .map(|(k, v)| (k, SqlValue::from(v)))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Builder-style field setter, handy for fixtures.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&SqlValue> {
        self.fields.get(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SqlValue)> {
        self.fields.iter()
    }
}

impl FromIterator<(String, SqlValue)> for ExternalRecord {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for ExternalRecord {
    type Item = (String, SqlValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, SqlValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// A row ready for the target table: only recognised columns, foreign keys
/// already rewritten to surrogate keys or NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetRow {
    columns: BTreeMap<String, SqlValue>,
}

impl TargetRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        self.columns.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Column names in statement order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SqlValue)> {
        self.columns.iter()
    }

    /// The row as a JSON object, used as the `jsonb` statement parameter.
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.columns
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Human-readable `col=value` description of the given key columns.
    pub fn describe_key(&self, key_columns: &[String]) -> String {
        key_columns
            .iter()
            .map(|c| match self.columns.get(c) {
                Some(v) => format!("{}={}", c, v),
                None => format!("{}=<missing>", c),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
