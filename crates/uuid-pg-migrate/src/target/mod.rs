//! PostgreSQL target database operations.
//!
//! Each row is first looked up by its natural key. An existing row gets an
//! `UPDATE` of the provided columns, a new one a plain `INSERT`. The row
//! travels as a single `jsonb` parameter and is expanded with
//! `jsonb_populate_record`, so PostgreSQL converts every value to the
//! declared column type and only the columns present in the row are named
//! in the statement. An omitted column therefore keeps its stored value on
//! update and gets its default on insert.

mod memory;

pub use memory::MemoryTarget;

use async_trait::async_trait;
use deadpool_postgres::Pool;
use tracing::{debug, info};

use crate::config::{TargetConfig, UpdatePolicy};
use crate::core::identifier::{qualify_pg, quote_list, quote_pg};
use crate::core::{SurrogateKey, TableSpec, TargetRow, TargetWriter};
use crate::error::{MigrateError, Result, RowErrorKind, RowLoadError};
use crate::pg;

/// PostgreSQL target. Holds a single session for the whole run.
pub struct PgTarget {
    pool: Pool,
    schema: String,
    update_policy: UpdatePolicy,
}

impl PgTarget {
    /// Connect to the target database.
    pub async fn new(config: &TargetConfig, update_policy: UpdatePolicy) -> Result<Self> {
        let params = config.connection_params()?;
        let pool = pg::connect(&params, 1, "target").await?;
        Ok(Self {
            pool,
            schema: config.schema.clone(),
            update_policy,
        })
    }

    fn row_error(
        spec: &TableSpec,
        row: &TargetRow,
        kind: RowErrorKind,
        message: impl Into<String>,
    ) -> RowLoadError {
        RowLoadError::new(&spec.name, row.describe_key(&spec.natural_key), kind, message)
    }
}

#[async_trait]
impl TargetWriter for PgTarget {
    async fn upsert(
        &self,
        spec: &TableSpec,
        row: &TargetRow,
    ) -> std::result::Result<SurrogateKey, RowLoadError> {
        check_natural_key(spec, row)?;

        let sql_error =
            |e: MigrateError| Self::row_error(spec, row, RowErrorKind::Other, e.to_string());
        let pg_error = |e: tokio_postgres::Error| {
            RowLoadError::from_pg(&spec.name, row.describe_key(&spec.natural_key), &e)
        };

        let lookup = build_lookup_sql(&self.schema, spec).map_err(sql_error)?;
        let client = pg::checkout(&self.pool, "target").await.map_err(sql_error)?;
        let payload = row.to_json();

        let existing = client
            .query_opt(lookup.as_str(), &[&payload])
            .await
            .map_err(pg_error)?
            .map(|r| r.get::<_, i64>(0));

        let key = match existing {
            Some(key) => {
                // Only the provided columns are assigned, so NOT NULL is
                // checked against the stored values of every omitted column.
                if let Some(update) = build_update_sql(&self.schema, spec, row, self.update_policy)
                    .map_err(sql_error)?
                {
                    let changed = client
                        .execute(update.as_str(), &[&payload])
                        .await
                        .map_err(pg_error)?;
                    debug!(
                        "{}: [{}] {}",
                        spec.name,
                        row.describe_key(&spec.natural_key),
                        if changed > 0 { "updated" } else { "unchanged" }
                    );
                }
                Some(key)
            }
            None => {
                let insert = build_insert_sql(&self.schema, spec, row).map_err(sql_error)?;
                match client
                    .query_opt(insert.as_str(), &[&payload])
                    .await
                    .map_err(pg_error)?
                {
                    Some(r) => Some(r.get::<_, i64>(0)),
                    // Another writer inserted the same natural key in between.
                    None => client
                        .query_opt(lookup.as_str(), &[&payload])
                        .await
                        .map_err(pg_error)?
                        .map(|r| r.get::<_, i64>(0)),
                }
            }
        };

        key.and_then(SurrogateKey::new).ok_or_else(|| {
            Self::row_error(
                spec,
                row,
                RowErrorKind::Other,
                format!("no positive {} returned for upserted row", spec.surrogate_key),
            )
        })
    }

    async fn lookup(&self, spec: &TableSpec, row: &TargetRow) -> Result<Option<SurrogateKey>> {
        if check_natural_key(spec, row).is_err() {
            return Ok(None);
        }
        let sql = build_lookup_sql(&self.schema, spec)?;
        let client = pg::checkout(&self.pool, "target").await?;
        let found = client.query_opt(sql.as_str(), &[&row.to_json()]).await?;
        Ok(found.and_then(|r| SurrogateKey::new(r.get::<_, i64>(0))))
    }

    async fn health_check(&self) -> Result<()> {
        let client = pg::checkout(&self.pool, "target").await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        self.pool.close();
        info!("Closed PostgreSQL target session");
    }
}

/// Reject a row that lacks any natural-key column before it reaches the store.
pub(crate) fn check_natural_key(
    spec: &TableSpec,
    row: &TargetRow,
) -> std::result::Result<(), RowLoadError> {
    let missing: Vec<&str> = spec
        .natural_key
        .iter()
        .filter(|c| row.get(c).map_or(true, |v| v.is_null()))
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(RowLoadError::new(
        &spec.name,
        row.describe_key(&spec.natural_key),
        RowErrorKind::MissingNaturalKey,
        format!("natural key column(s) missing: {}", missing.join(", ")),
    ))
}

/// Build the insert statement for a row with no stored counterpart.
/// `$1` is the row as `jsonb`.
fn build_insert_sql(schema: &str, spec: &TableSpec, row: &TargetRow) -> Result<String> {
    let table = qualify_pg(schema, &spec.name)?;
    let cols = row.column_names();
    if cols.is_empty() {
        return Err(MigrateError::Config(format!(
            "no columns to write for table '{}'",
            spec.name
        )));
    }
    let col_list = quote_list(&cols)?;

    Ok(format!(
        "INSERT INTO {table} ({cols}) \
         SELECT {cols} FROM jsonb_populate_record(NULL::{table}, $1::jsonb) \
         ON CONFLICT ({keys}) DO NOTHING \
         RETURNING {surrogate}::bigint",
        table = table,
        cols = col_list,
        keys = quote_list(&spec.natural_key)?,
        surrogate = quote_pg(&spec.surrogate_key)?,
    ))
}

/// Build the update statement for a row that already exists, or `None` when
/// nothing may change: insert-only policy, or a row holding only its key.
///
/// Values are compared through `to_jsonb` so column types without an
/// equality operator (`json`) can be written too.
fn build_update_sql(
    schema: &str,
    spec: &TableSpec,
    row: &TargetRow,
    policy: UpdatePolicy,
) -> Result<Option<String>> {
    if policy == UpdatePolicy::InsertOnly {
        return Ok(None);
    }
    let update_cols: Vec<String> = row
        .column_names()
        .iter()
        .filter(|c| !spec.is_natural_key(c))
        .map(|c| quote_pg(c))
        .collect::<Result<_>>()?;
    if update_cols.is_empty() {
        return Ok(None);
    }

    let set_clause = update_cols
        .iter()
        .map(|c| format!("{} = src.{}", c, c))
        .collect::<Vec<_>>()
        .join(", ");
    let change_detection = update_cols
        .iter()
        .map(|c| format!("to_jsonb(tgt.{}) IS DISTINCT FROM to_jsonb(src.{})", c, c))
        .collect::<Vec<_>>()
        .join(" OR ");
    let table = qualify_pg(schema, &spec.name)?;

    Ok(Some(format!(
        "UPDATE {table} AS tgt SET {set} \
         FROM jsonb_populate_record(NULL::{table}, $1::jsonb) AS src \
         WHERE {key_match} AND ({changed})",
        table = table,
        set = set_clause,
        key_match = natural_key_match(spec)?,
        changed = change_detection,
    )))
}

/// `tgt.k = src.k AND ...` over the natural key.
fn natural_key_match(spec: &TableSpec) -> Result<String> {
    Ok(spec
        .natural_key
        .iter()
        .map(|c| quote_pg(c).map(|q| format!("tgt.{} = src.{}", q, q)))
        .collect::<Result<Vec<_>>>()?
        .join(" AND "))
}

/// Build the natural-key lookup statement. `$1` is the row as `jsonb`.
fn build_lookup_sql(schema: &str, spec: &TableSpec) -> Result<String> {
    let table = qualify_pg(schema, &spec.name)?;
    let surrogate = quote_pg(&spec.surrogate_key)?;
    let predicate = natural_key_match(spec)?;

    Ok(format!(
        "SELECT tgt.{surrogate}::bigint FROM {table} AS tgt, \
         jsonb_populate_record(NULL::{table}, $1::jsonb) AS src \
         WHERE {predicate} LIMIT 1",
        surrogate = surrogate,
        table = table,
        predicate = predicate,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlValue;

    fn orders() -> TableSpec {
        TableSpec::new("orders", &["code"]).with_foreign_key("user_id", "user")
    }

    fn row() -> TargetRow {
        TargetRow::new()
            .with("code", "A-1")
            .with("amount", 5i64)
            .with("user_id", SqlValue::Null)
    }

    #[test]
    fn test_insert_sql_names_only_provided_columns() {
        let sql = build_insert_sql("public", &orders(), &row()).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"public\".\"orders\" (\"amount\", \"code\", \"user_id\") \
             SELECT \"amount\", \"code\", \"user_id\" \
             FROM jsonb_populate_record(NULL::\"public\".\"orders\", $1::jsonb) \
             ON CONFLICT (\"code\") DO NOTHING RETURNING \"id\"::bigint"
        );
    }

    #[test]
    fn test_update_sql_assigns_non_key_columns() {
        let sql = build_update_sql("public", &orders(), &row(), UpdatePolicy::Overwrite)
            .unwrap()
            .unwrap();
        assert!(sql.starts_with("UPDATE \"public\".\"orders\" AS tgt SET \"amount\" = src.\"amount\", \"user_id\" = src.\"user_id\" "));
        assert!(!sql.contains("\"code\" = src"));
        assert!(sql.contains("WHERE tgt.\"code\" = src.\"code\" AND ("));
        assert!(!sql.contains("INSERT"));
    }

    #[test]
    fn test_update_sql_compares_through_jsonb() {
        let row = TargetRow::new()
            .with("code", "d1")
            .with("meta", SqlValue::Json(serde_json::json!({"a": 1})));
        let sql = build_update_sql("public", &TableSpec::new("docs", &["code"]), &row, UpdatePolicy::Overwrite)
            .unwrap()
            .unwrap();
        assert!(sql.ends_with("(to_jsonb(tgt.\"meta\") IS DISTINCT FROM to_jsonb(src.\"meta\"))"));
        assert!(!sql.contains("tgt.\"meta\" IS DISTINCT"));
    }

    #[test]
    fn test_update_sql_skipped_for_insert_only_and_key_only_rows() {
        assert!(build_update_sql("public", &orders(), &row(), UpdatePolicy::InsertOnly)
            .unwrap()
            .is_none());
        let key_only = TargetRow::new().with("code", "A-1");
        assert!(build_update_sql("public", &orders(), &key_only, UpdatePolicy::Overwrite)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_insert_sql_quotes_hostile_names() {
        let spec = TableSpec::new("ord\"ers", &["code"]);
        let sql = build_insert_sql("public", &spec, &TargetRow::new().with("code", "x")).unwrap();
        assert!(sql.contains("\"public\".\"ord\"\"ers\""));
    }

    #[test]
    fn test_lookup_sql_composite_key() {
        let spec = TableSpec::new("memberships", &["user_id", "org_id"]);
        let sql = build_lookup_sql("app", &spec).unwrap();
        assert!(sql.starts_with("SELECT tgt.\"id\"::bigint FROM \"app\".\"memberships\" AS tgt"));
        assert!(sql.contains("tgt.\"user_id\" = src.\"user_id\" AND tgt.\"org_id\" = src.\"org_id\""));
        assert!(sql.ends_with("LIMIT 1"));
    }

    #[test]
    fn test_check_natural_key() {
        let spec = TableSpec::new("users", &["email", "tenant"]);
        let ok = TargetRow::new().with("email", "a@x").with("tenant", "t1");
        assert!(check_natural_key(&spec, &ok).is_ok());

        let partial = TargetRow::new().with("email", "a@x");
        let err = check_natural_key(&spec, &partial).unwrap_err();
        assert_eq!(err.kind, RowErrorKind::MissingNaturalKey);
        assert!(err.message.contains("tenant"));
        assert_eq!(err.natural_key, "email=a@x, tenant=<missing>");
    }
}

/// Round trips against a real database configured through `TARGET_DB_*`.
/// Every test returns early when `TARGET_DB_HOST` is unset.
#[cfg(test)]
mod live_tests {
    use super::*;
    use crate::config::Config;
    use crate::core::SqlValue;
    use serde_json::json;

    async fn live_target(policy: UpdatePolicy) -> Option<PgTarget> {
        if std::env::var("TARGET_DB_HOST").map_or(true, |h| h.is_empty()) {
            eprintln!("TARGET_DB_HOST not set, skipping");
            return None;
        }
        let mut config = Config::default();
        config.apply_env(|k| std::env::var(k).ok()).unwrap();
        Some(PgTarget::new(&config.target, policy).await.unwrap())
    }

    /// Create a uniquely named table and return its name.
    async fn scratch_table(target: &PgTarget, prefix: &str, columns: &str) -> String {
        let name = format!("{}_{}", prefix, uuid::Uuid::new_v4().simple());
        let client = pg::checkout(&target.pool, "target").await.unwrap();
        client
            .batch_execute(&format!(
                "CREATE TABLE {} (id bigserial PRIMARY KEY, {})",
                qualify_pg(&target.schema, &name).unwrap(),
                columns
            ))
            .await
            .unwrap();
        name
    }

    async fn drop_table(target: &PgTarget, name: &str) {
        let client = pg::checkout(&target.pool, "target").await.unwrap();
        client
            .batch_execute(&format!(
                "DROP TABLE {}",
                qualify_pg(&target.schema, name).unwrap()
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_blank_not_null_column_keeps_stored_value() {
        let Some(target) = live_target(UpdatePolicy::Overwrite).await else {
            return;
        };
        let table = scratch_table(
            &target,
            "nn_users",
            "email text NOT NULL UNIQUE, name text NOT NULL, age int",
        )
        .await;
        let spec = TableSpec::new(table.as_str(), &["email"]);

        let first = TargetRow::new()
            .with("email", "a@example.com")
            .with("name", "Ann")
            .with("age", 30i64);
        let key = target.upsert(&spec, &first).await.unwrap();

        // The source now has an empty name, which the transformer leaves out.
        let second = TargetRow::new().with("email", "a@example.com").with("age", 31i64);
        assert_eq!(target.upsert(&spec, &second).await.unwrap(), key);
        assert_eq!(target.upsert(&spec, &second).await.unwrap(), key);
        assert_eq!(target.lookup(&spec, &second).await.unwrap(), Some(key));

        // An explicit NULL still reaches the constraint.
        let cleared = TargetRow::new()
            .with("email", "a@example.com")
            .with("name", SqlValue::Null);
        let err = target.upsert(&spec, &cleared).await.unwrap_err();
        assert_eq!(err.kind, RowErrorKind::NotNull);

        let client = pg::checkout(&target.pool, "target").await.unwrap();
        let stored = client
            .query_one(
                &format!(
                    "SELECT name, age, count(*) OVER () FROM {}",
                    qualify_pg(&target.schema, &table).unwrap()
                ),
                &[],
            )
            .await
            .unwrap();
        assert_eq!(stored.get::<_, String>(0), "Ann");
        assert_eq!(stored.get::<_, i32>(1), 31);
        assert_eq!(stored.get::<_, i64>(2), 1);
        drop(client);

        drop_table(&target, &table).await;
        target.close().await;
    }

    #[tokio::test]
    async fn test_json_column_inserts_and_updates() {
        let Some(target) = live_target(UpdatePolicy::Overwrite).await else {
            return;
        };
        let table = scratch_table(&target, "json_docs", "code text UNIQUE, meta json").await;
        let spec = TableSpec::new(table.as_str(), &["code"]);

        let doc = |meta: serde_json::Value| {
            TargetRow::new()
                .with("code", "d1")
                .with("meta", SqlValue::Json(meta))
        };
        let key = target.upsert(&spec, &doc(json!({"a": 1}))).await.unwrap();
        assert_eq!(target.upsert(&spec, &doc(json!({"a": 1}))).await.unwrap(), key);
        assert_eq!(target.upsert(&spec, &doc(json!({"a": 2}))).await.unwrap(), key);

        let client = pg::checkout(&target.pool, "target").await.unwrap();
        let stored = client
            .query_one(
                &format!(
                    "SELECT meta FROM {}",
                    qualify_pg(&target.schema, &table).unwrap()
                ),
                &[],
            )
            .await
            .unwrap();
        assert_eq!(stored.get::<_, serde_json::Value>(0), json!({"a": 2}));
        drop(client);

        drop_table(&target, &table).await;
        target.close().await;
    }

    #[tokio::test]
    async fn test_insert_only_leaves_existing_row() {
        let Some(target) = live_target(UpdatePolicy::InsertOnly).await else {
            return;
        };
        let table = scratch_table(&target, "io_users", "email text UNIQUE, name text").await;
        let spec = TableSpec::new(table.as_str(), &["email"]);

        let key = target
            .upsert(&spec, &TargetRow::new().with("email", "a@x").with("name", "Old"))
            .await
            .unwrap();
        let again = target
            .upsert(&spec, &TargetRow::new().with("email", "a@x").with("name", "New"))
            .await
            .unwrap();
        assert_eq!(again, key);

        let client = pg::checkout(&target.pool, "target").await.unwrap();
        let stored = client
            .query_one(
                &format!(
                    "SELECT name FROM {}",
                    qualify_pg(&target.schema, &table).unwrap()
                ),
                &[],
            )
            .await
            .unwrap();
        assert_eq!(stored.get::<_, String>(0), "Old");
        drop(client);

        drop_table(&target, &table).await;
        target.close().await;
    }
}
