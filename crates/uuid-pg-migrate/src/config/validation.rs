//! Configuration validation.

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::core::{LoadPlan, TableSpec};
use crate::error::{MigrateError, Result};
use crate::pg::SslMode;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    match config.source.r#type.as_str() {
        "json_dir" => {
            if config.source.dir.is_none() {
                return Err(MigrateError::Config(
                    "source.dir is required for source.type 'json_dir'".into(),
                ));
            }
        }
        "postgres" => {
            if config.source.host.is_empty() {
                return Err(MigrateError::Config("source.host is required".into()));
            }
            if config.source.database.is_empty() {
                return Err(MigrateError::Config("source.database is required".into()));
            }
            if config.source.user.is_empty() {
                return Err(MigrateError::Config("source.user is required".into()));
            }
            validate_identifier(&config.source.schema)?;
            config.source.ssl_mode.parse::<SslMode>()?;
        }
        other => {
            return Err(MigrateError::Config(format!(
                "source.type must be 'json_dir' or 'postgres', got '{}'",
                other
            )));
        }
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    if config.target.r#type != "postgres" {
        return Err(MigrateError::Config(format!(
            "target.type must be 'postgres', got '{}'",
            config.target.r#type
        )));
    }
    validate_identifier(&config.target.schema)?;
    config.target.ssl_mode.parse::<SslMode>()?;

    // Reading and writing the same schema of the same database would upsert
    // rows onto themselves.
    if config.source.is_postgres()
        && config.source.host == config.target.host
        && config.source.port == config.target.port
        && config.source.database == config.target.database
        && config.source.schema == config.target.schema
    {
        return Err(MigrateError::Config(
            "source and target cannot be the same database schema".into(),
        ));
    }

    // Table validation
    if config.tables.is_empty() {
        return Err(MigrateError::Config(
            "at least one entry under tables is required".into(),
        ));
    }
    for spec in &config.tables {
        validate_table(spec)?;
    }
    LoadPlan::build(&config.tables)?;

    Ok(())
}

fn validate_table(spec: &TableSpec) -> Result<()> {
    validate_identifier(&spec.name)?;
    validate_identifier(spec.source_table())?;
    validate_identifier(&spec.surrogate_key)?;

    if spec.natural_key.is_empty() {
        return Err(MigrateError::Config(format!(
            "table '{}': natural_key must name at least one column",
            spec.name
        )));
    }
    for column in &spec.natural_key {
        validate_identifier(column)?;
        if *column == spec.surrogate_key {
            return Err(MigrateError::Config(format!(
                "table '{}': surrogate key '{}' cannot be part of the natural key",
                spec.name, column
            )));
        }
        if spec.drop_fields.contains(column) {
            return Err(MigrateError::Config(format!(
                "table '{}': natural key column '{}' is listed in drop_fields",
                spec.name, column
            )));
        }
    }

    for fk in &spec.foreign_keys {
        validate_identifier(&fk.column)?;
        if spec.drop_fields.contains(&fk.column) {
            return Err(MigrateError::Config(format!(
                "table '{}': foreign key column '{}' is listed in drop_fields",
                spec.name, fk.column
            )));
        }
    }

    if let Some(identity) = &spec.identity {
        if identity.scope.is_empty() {
            return Err(MigrateError::Config(format!(
                "table '{}': identity.scope cannot be empty",
                spec.name
            )));
        }
    }

    if let Some(column) = &spec.external_id_column {
        validate_identifier(column)?;
        if spec.identity.is_none() {
            return Err(MigrateError::Config(format!(
                "table '{}': external_id_column requires identity",
                spec.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MigrationConfig, SourceConfig, TargetConfig};
    use std::path::PathBuf;

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                dir: Some(PathBuf::from("./export")),
                ..SourceConfig::default()
            },
            target: TargetConfig {
                host: "localhost".to_string(),
                database: "target_db".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                ..TargetConfig::default()
            },
            migration: MigrationConfig::default(),
            tables: vec![
                TableSpec::new("users", &["email"]).with_identity("user"),
                TableSpec::new("orders", &["code"]).with_foreign_key("user_id", "user"),
            ],
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_json_dir_requires_dir() {
        let mut config = valid_config();
        config.source.dir = None;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_postgres_source_requires_host() {
        let mut config = valid_config();
        config.source.r#type = "postgres".to_string();
        assert!(validate(&config).is_err());

        config.source.host = "legacy".to_string();
        config.source.database = "legacy_db".to_string();
        config.source.user = "reader".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_same_database_schema_rejected() {
        let mut config = valid_config();
        config.source.r#type = "postgres".to_string();
        config.source.host = "localhost".to_string();
        config.source.database = "target_db".to_string();
        config.source.user = "postgres".to_string();
        assert!(validate(&config).is_err());

        config.source.schema = "legacy".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_wrong_source_type() {
        let mut config = valid_config();
        config.source.r#type = "mssql".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_wrong_target_type() {
        let mut config = valid_config();
        config.target.r#type = "mssql".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_target_host() {
        let mut config = valid_config();
        config.target.host = String::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_no_tables_rejected() {
        let mut config = valid_config();
        config.tables.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_natural_key_rejected() {
        let mut config = valid_config();
        config.tables[0].natural_key.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_surrogate_key_in_natural_key_rejected() {
        let mut config = valid_config();
        config.tables[0].natural_key = vec!["id".to_string()];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unknown_scope_rejected() {
        let mut config = valid_config();
        config.tables[1] = TableSpec::new("orders", &["code"]).with_foreign_key("shop_id", "shop");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_external_id_column_requires_identity() {
        let mut config = valid_config();
        config.tables[1].external_id_column = Some("source_uuid".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_ssl_mode_rejected() {
        let mut config = valid_config();
        config.target.ssl_mode = "prefer".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_source_config_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_123"));
    }

    #[test]
    fn test_target_config_debug_redacts_password() {
        let mut config = valid_config();
        config.target.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config.target);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_456"));
    }
}
