//! Configuration loading and validation.
//!
//! A run is described by one YAML file. Connection settings can be left out
//! of the file and supplied through `TARGET_DB_*`, `SOURCE_DB_*` and
//! `SOURCE_DIR` environment variables, which take precedence over the file.

mod types;
mod validation;

pub use types::*;

use std::path::{Path, PathBuf};

use crate::error::{MigrateError, Result};
use crate::pg::{ConnectionParams, SslMode};

impl Config {
    /// Load configuration from a YAML file, overlay the process environment
    /// and validate the result.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file and overlay the process environment without
    /// validating, so callers can apply further overrides first.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config = Self::parse(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Override connection settings from environment-style variables.
    ///
    /// `lookup` returns the value of a variable, or `None` when unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("TARGET_DB_HOST") {
            self.target.host = v;
        }
        if let Some(v) = get("TARGET_DB_PORT") {
            self.target.port = parse_port("TARGET_DB_PORT", &v)?;
        }
        if let Some(v) = get("TARGET_DB_USER") {
            self.target.user = v;
        }
        if let Some(v) = get("TARGET_DB_PASSWORD") {
            self.target.password = v;
        }
        if let Some(v) = get("TARGET_DB_NAME") {
            self.target.database = v;
        }
        if let Some(v) = get("TARGET_DB_SCHEMA") {
            self.target.schema = v;
        }
        if let Some(v) = get("TARGET_DB_SSLMODE") {
            self.target.ssl_mode = v;
        }

        if let Some(v) = get("SOURCE_DIR") {
            self.source.dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("SOURCE_DB_HOST") {
            self.source.host = v;
        }
        if let Some(v) = get("SOURCE_DB_PORT") {
            self.source.port = parse_port("SOURCE_DB_PORT", &v)?;
        }
        if let Some(v) = get("SOURCE_DB_USER") {
            self.source.user = v;
        }
        if let Some(v) = get("SOURCE_DB_PASSWORD") {
            self.source.password = v;
        }
        if let Some(v) = get("SOURCE_DB_NAME") {
            self.source.database = v;
        }
        if let Some(v) = get("SOURCE_DB_SCHEMA") {
            self.source.schema = v;
        }
        if let Some(v) = get("SOURCE_DB_SSLMODE") {
            self.source.ssl_mode = v;
        }

        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16> {
    value
        .parse()
        .map_err(|_| MigrateError::Config(format!("{} must be a port number, got '{}'", key, value)))
}

impl SourceConfig {
    pub fn is_postgres(&self) -> bool {
        self.r#type == "postgres"
    }

    /// Session parameters for a `postgres` source.
    pub fn connection_params(&self) -> Result<ConnectionParams> {
        Ok(ConnectionParams {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            ssl_mode: self.ssl_mode.parse::<SslMode>()?,
        })
    }
}

impl TargetConfig {
    /// Session parameters for the target database.
    pub fn connection_params(&self) -> Result<ConnectionParams> {
        Ok(ConnectionParams {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            ssl_mode: self.ssl_mode.parse::<SslMode>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const YAML: &str = r#"
source:
  type: json_dir
  dir: ./export
target:
  host: localhost
  database: app
  user: loader
  password: secret
migration:
  max_error_samples: 5
  on_source_error: abort_run
tables:
  - name: users
    natural_key: [email]
    identity: { scope: user }
  - name: orders
    natural_key: [code]
    foreign_keys:
      - { column: user_id, scope: user }
"#;

    #[test]
    fn test_from_yaml() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.tables.len(), 2);
        assert_eq!(config.target.port, 5432);
        assert_eq!(config.target.schema, "public");
        assert_eq!(config.migration.max_error_samples, 5);
        assert_eq!(
            config.migration.on_source_error,
            SourceFailurePolicy::AbortRun
        );
        assert_eq!(config.migration.update_policy, UpdatePolicy::Overwrite);
        assert_eq!(config.tables[0].identity.as_ref().unwrap().id_field, "id");
        assert_eq!(config.tables[1].surrogate_key, "id");
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::parse(YAML).unwrap();
        let env: HashMap<&str, &str> = [
            ("TARGET_DB_HOST", "db.internal"),
            ("TARGET_DB_PORT", "6432"),
            ("TARGET_DB_PASSWORD", "from-env"),
            ("SOURCE_DIR", "/data/export"),
            ("TARGET_DB_USER", ""),
        ]
        .into_iter()
        .collect();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.target.host, "db.internal");
        assert_eq!(config.target.port, 6432);
        assert_eq!(config.target.password, "from-env");
        // Empty variables do not clear file values.
        assert_eq!(config.target.user, "loader");
        assert_eq!(config.source.dir, Some(PathBuf::from("/data/export")));
    }

    #[test]
    fn test_env_bad_port_is_config_error() {
        let mut config = Config::parse(YAML).unwrap();
        let err = config
            .apply_env(|k| (k == "TARGET_DB_PORT").then(|| "abc".to_string()))
            .unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.tables[0].name, "users");
    }

    #[test]
    fn test_read_defers_validation() {
        let yaml = YAML.replace("  type: json_dir\n  dir: ./export\n", "  type: json_dir\n");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        assert!(Config::load(file.path()).is_err());
        let mut config = Config::read(file.path()).unwrap();
        assert!(config.source.dir.is_none());
        config.source.dir = Some(PathBuf::from("/data/export"));
        config.validate().unwrap();
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = Config::load("/nonexistent/migrate.yaml").unwrap_err();
        assert!(matches!(err, MigrateError::Io(_)));
    }

    #[test]
    fn test_connection_params_parse_ssl_mode() {
        let mut config = Config::parse(YAML).unwrap();
        config.target.ssl_mode = "verify-full".to_string();
        let params = config.target.connection_params().unwrap();
        assert_eq!(params.ssl_mode, SslMode::VerifyFull);
        assert_eq!(params.summary(), "localhost:5432/app");

        config.target.ssl_mode = "sometimes".to_string();
        assert!(config.target.connection_params().is_err());
    }
}
