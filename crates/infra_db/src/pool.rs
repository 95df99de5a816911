//! Connection pool and migrations
//!
//! Pool sizing and timeouts come from `DatabaseConfig`, which deserializes
//! from the batch configuration with whole-second durations.

use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::DatabaseError;

pub type DatabasePool = PgPool;

/// Pool settings
///
/// # Example
///
/// ```rust
/// use infra_db::DatabaseConfig;
/// use std::time::Duration;
///
/// let config = DatabaseConfig::new("postgres://localhost/revenue")
///     .max_connections(20)
///     .statement_timeout(Duration::from_secs(15));
/// assert_eq!(config.max_connections, 20);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long to wait for a pooled connection
    #[serde(with = "seconds")]
    pub connect_timeout: Duration,
    #[serde(with = "seconds")]
    pub max_lifetime: Duration,
    #[serde(with = "seconds")]
    pub idle_timeout: Duration,
    /// Server-side cap on a single statement; zero disables it
    #[serde(with = "seconds")]
    pub statement_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout: Duration::from_secs(30),
            max_lifetime: Duration::from_secs(30 * 60),
            idle_timeout: Duration::from_secs(10 * 60),
            statement_timeout: Duration::from_secs(30),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    fn connect_options(&self) -> Result<PgConnectOptions, DatabaseError> {
        let options = PgConnectOptions::from_str(&self.url)
            .map_err(|e| DatabaseError::ConnectionFailed(format!("invalid database url: {}", e)))?;
        if self.statement_timeout.is_zero() {
            return Ok(options);
        }
        let millis = self.statement_timeout.as_millis().to_string();
        Ok(options.options([("statement_timeout", millis.as_str())]))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new("postgres://localhost/revenue")
    }
}

/// Opens a pool with the given settings
///
/// # Errors
///
/// Returns `DatabaseError::ConnectionFailed` if the URL is invalid or the
/// first connection cannot be established.
pub async fn create_pool(config: DatabaseConfig) -> Result<DatabasePool, DatabaseError> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        statement_timeout_ms = config.statement_timeout.as_millis() as u64,
        "creating database pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.idle_timeout)
        .connect_with(config.connect_options()?)
        .await
        .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

    info!("database pool ready");
    Ok(pool)
}

/// Applies the embedded migrations under `migrations/`
pub async fn run_migrations(pool: &DatabasePool) -> Result<(), DatabaseError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
    info!("database migrations applied");
    Ok(())
}

/// Durations are configured as whole seconds
mod seconds {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
