//! Source stores.
//!
//! - [`JsonDirSource`]: a directory of exported JSON files, one per table
//! - [`PgSource`]: tables of a PostgreSQL schema, read as `jsonb`
//! - [`MemorySource`]: fixed records, for tests and embedding

mod json_dir;
mod memory;
mod postgres;

pub use json_dir::JsonDirSource;
pub use memory::MemorySource;
pub use postgres::PgSource;

use serde_json::Value as JsonValue;

use crate::core::ExternalRecord;
use crate::error::{MigrateError, Result};

/// Turn a JSON export into records.
///
/// Accepts a top-level array of objects, or an object whose `rows` field is
/// such an array. Anything else makes the whole table unavailable.
pub(crate) fn records_from_json(table: &str, doc: JsonValue) -> Result<Vec<ExternalRecord>> {
    let items = match doc {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut map) => match map.remove("rows") {
            Some(JsonValue::Array(items)) => items,
            _ => {
                return Err(MigrateError::source_unavailable(
                    table,
                    "expected an array of records or an object with a 'rows' array",
                ))
            }
        },
        _ => {
            return Err(MigrateError::source_unavailable(
                table,
                "expected an array of records",
            ))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            ExternalRecord::from_json(item).ok_or_else(|| {
                MigrateError::source_unavailable(table, format!("record {} is not an object", i))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_array_document() {
        let records = records_from_json("users", json!([{"id": "a"}, {"id": "b"}])).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_rows_wrapper_document() {
        let records = records_from_json("users", json!({"rows": [{"id": "a"}]})).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_non_object_record_makes_table_unavailable() {
        let err = records_from_json("users", json!([{"id": "a"}, 7])).unwrap_err();
        match err {
            MigrateError::SourceUnavailable { table, message } => {
                assert_eq!(table, "users");
                assert!(message.contains("record 1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_scalar_document_rejected() {
        assert!(records_from_json("users", json!("nope")).is_err());
        assert!(records_from_json("users", json!({"data": []})).is_err());
    }
}
