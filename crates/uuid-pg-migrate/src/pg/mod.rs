//! PostgreSQL session setup shared by the source reader and target writer.

mod tls;

pub use tls::SslMode;

use std::fmt;

use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::{info, warn};

use crate::error::{MigrateError, Result};

/// Everything needed to open a PostgreSQL session.
#[derive(Clone)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub ssl_mode: SslMode,
}

impl ConnectionParams {
    /// `host:port/database`, safe to log.
    pub fn summary(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }

    fn pg_config(&self) -> PgConfig {
        let mut pg_config = PgConfig::new();
        pg_config.host(&self.host);
        pg_config.port(self.port);
        pg_config.dbname(&self.database);
        pg_config.user(&self.user);
        pg_config.password(&self.password);
        pg_config.application_name("uuid-pg-migrate");
        pg_config
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Build a pool and check it with `SELECT 1`.
///
/// `max_size` is 1 for the target: every statement of a run goes through the
/// same session.
pub async fn connect(params: &ConnectionParams, max_size: usize, role: &str) -> Result<Pool> {
    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };

    let mgr = match params.ssl_mode.connector()? {
        Some(tls) => Manager::from_config(params.pg_config(), tls, mgr_config),
        None => {
            warn!(
                "PostgreSQL {} TLS is disabled. Credentials will be transmitted in plaintext.",
                role
            );
            Manager::from_config(params.pg_config(), NoTls, mgr_config)
        }
    };

    let pool = Pool::builder(mgr)
        .max_size(max_size)
        .build()
        .map_err(|e| MigrateError::pool(e, format!("creating PostgreSQL {} pool", role)))?;

    let client = checkout(&pool, role).await?;
    client.simple_query("SELECT 1").await?;

    info!("Connected to PostgreSQL {}: {}", role, params.summary());
    Ok(pool)
}

/// Take a session from the pool.
pub async fn checkout(pool: &Pool, role: &str) -> Result<Object> {
    pool.get()
        .await
        .map_err(|e| MigrateError::pool(e, format!("getting PostgreSQL {} connection", role)))
}
