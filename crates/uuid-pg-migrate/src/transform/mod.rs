//! Source record to target row transformation.
//!
//! [`transform`] is a pure function of the table spec, the record and the
//! current translator contents. It never touches a store, so everything it
//! decides is visible in its return value.

use tracing::debug;

use crate::core::{ExternalRecord, SqlValue, TableSpec, TargetRow};
use crate::translate::Translator;

/// A foreign-key value the translator could not resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    pub column: String,
    pub scope: String,
    pub external_id: String,
}

/// Output of [`transform`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    /// Row to upsert.
    pub row: TargetRow,
    /// Foreign keys written as NULL because they did not resolve.
    pub unresolved: Vec<UnresolvedReference>,
}

/// External id of an identity-producing record, if the table has one and
/// the record carries a usable value.
pub fn external_id(spec: &TableSpec, record: &ExternalRecord) -> Option<String> {
    let identity = spec.identity.as_ref()?;
    record
        .get(&identity.id_field)
        .and_then(SqlValue::as_external_id)
}

/// Convert a source record into a row for `spec`'s target table.
///
/// 1. Fields with no target column are dropped: `drop_fields`, the identity
///    id field (copied to `external_id_column` when configured), the
///    surrogate key column (assigned by the target) and, when `columns` is
///    set, anything outside that list.
/// 2. NULL and empty-string fields are dropped so the statement leaves the
///    column alone.
/// 3. Foreign-key fields are rewritten to surrogate keys; a reference that
///    does not resolve becomes an explicit NULL.
pub fn transform(spec: &TableSpec, record: ExternalRecord, translator: &Translator) -> Transformed {
    let id_field = spec.identity.as_ref().map(|i| i.id_field.as_str());
    let mut row = TargetRow::new();
    let mut unresolved = Vec::new();

    if let (Some(column), Some(id)) = (&spec.external_id_column, external_id(spec, &record)) {
        row.insert(column.clone(), SqlValue::Text(id));
    }

    for (field, value) in record {
        if Some(field.as_str()) == id_field
            || field == spec.surrogate_key
            || spec.drop_fields.contains(&field)
            || Some(&field) == spec.external_id_column.as_ref()
        {
            continue;
        }

        let fk = spec.foreign_key(&field);
        if let Some(allowed) = &spec.columns {
            if fk.is_none() && !allowed.contains(&field) {
                continue;
            }
        }

        if value.is_blank() {
            continue;
        }

        match fk {
            Some(fk) => {
                let resolved = value
                    .as_external_id()
                    .and_then(|id| translator.resolve(&fk.scope, &id));
                match resolved {
                    Some(key) => row.insert(field, key),
                    None => {
                        let external_id = value.to_string();
                        debug!(
                            "{}.{}: unresolved {} reference '{}', writing NULL",
                            spec.name, field, fk.scope, external_id
                        );
                        unresolved.push(UnresolvedReference {
                            column: field.clone(),
                            scope: fk.scope.clone(),
                            external_id,
                        });
                        row.insert(field, SqlValue::Null);
                    }
                }
            }
            None => row.insert(field, value),
        }
    }

    Transformed { row, unresolved }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SurrogateKey;

    fn translator() -> Translator {
        Translator::with_entries(vec![(
            "user".to_string(),
            "uuid-A".to_string(),
            SurrogateKey::new(101).unwrap(),
        )])
        .unwrap()
    }

    fn orders() -> TableSpec {
        TableSpec::new("orders", &["code"]).with_foreign_key("user_id", "user")
    }

    #[test]
    fn test_foreign_key_is_rewritten() {
        let record = ExternalRecord::new()
            .with("user_id", "uuid-A")
            .with("amount", 5i64);
        let out = transform(&orders(), record, &translator());
        assert_eq!(out.row.get("user_id"), Some(&SqlValue::Int(101)));
        assert_eq!(out.row.get("amount"), Some(&SqlValue::Int(5)));
        assert!(out.unresolved.is_empty());
    }

    #[test]
    fn test_unresolved_foreign_key_becomes_null() {
        let record = ExternalRecord::new()
            .with("user_id", "uuid-missing")
            .with("amount", 5i64);
        let out = transform(&orders(), record, &translator());
        assert_eq!(out.row.get("user_id"), Some(&SqlValue::Null));
        assert_eq!(out.unresolved.len(), 1);
        assert_eq!(out.unresolved[0].scope, "user");
        assert_eq!(out.unresolved[0].external_id, "uuid-missing");
    }

    #[test]
    fn test_blank_fields_are_omitted() {
        let record = ExternalRecord::new()
            .with("code", "A-1")
            .with("note", "")
            .with("shipped_at", SqlValue::Null)
            .with("user_id", SqlValue::Null);
        let out = transform(&orders(), record, &translator());
        assert_eq!(out.row.column_names(), vec!["code".to_string()]);
        assert!(out.unresolved.is_empty());
    }

    #[test]
    fn test_relation_fields_and_surrogate_are_dropped() {
        let spec = orders().with_drop_field("user");
        let record = ExternalRecord::new()
            .with("id", "ord-uuid-1")
            .with("code", "A-1")
            .with("user", SqlValue::Json(serde_json::json!({"id": "uuid-A"})));
        let out = transform(&spec, record, &translator());
        assert_eq!(out.row.column_names(), vec!["code".to_string()]);
    }

    #[test]
    fn test_column_allow_list_keeps_foreign_keys() {
        let mut spec = orders();
        spec.columns = Some(vec!["code".to_string()]);
        let record = ExternalRecord::new()
            .with("code", "A-1")
            .with("legacy_flag", true)
            .with("user_id", "uuid-A");
        let out = transform(&spec, record, &translator());
        assert_eq!(
            out.row.column_names(),
            vec!["code".to_string(), "user_id".to_string()]
        );
    }

    #[test]
    fn test_identity_id_moves_to_external_id_column() {
        let spec = TableSpec::new("users", &["email"])
            .with_identity("user")
            .with_external_id_column("source_uuid");
        let record = ExternalRecord::new()
            .with("id", "uuid-A")
            .with("email", "a@example.com");
        assert_eq!(external_id(&spec, &record).as_deref(), Some("uuid-A"));
        let out = transform(&spec, record, &Translator::new());
        assert_eq!(
            out.row.get("source_uuid"),
            Some(&SqlValue::Text("uuid-A".into()))
        );
        assert!(!out.row.contains("id"));
    }

    #[test]
    fn test_external_id_requires_identity() {
        let record = ExternalRecord::new().with("id", "uuid-A");
        assert_eq!(external_id(&orders(), &record), None);
    }

    #[test]
    fn test_transform_does_not_touch_translator() {
        let t = translator();
        let record = ExternalRecord::new().with("user_id", "uuid-B");
        let _ = transform(&orders(), record, &t);
        assert_eq!(t.len(), 1);
    }
}
