//! Batch configuration

use serde::Deserialize;
use std::path::Path;

use domain_revenue::EngineConfig;
use infra_db::DatabaseConfig;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Configuration for the batch binaries
///
/// Sources, later ones winning: defaults, an optional file, then
/// `REVENUE_`-prefixed environment variables with `__` separating nested
/// keys (`REVENUE_DATABASE__URL`, `REVENUE_ENGINE__OPERATION_TIMEOUT_MS`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_level: String,
    pub log_format: LogFormat,
    /// Recorded as the actor on every change the import makes
    pub actor: String,
    /// Apply embedded migrations before importing
    pub run_migrations: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            engine: EngineConfig::default(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            actor: "remittance-import".to_string(),
            run_migrations: false,
        }
    }
}

impl BatchConfig {
    /// Loads configuration from the environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(None)
    }

    /// Loads configuration from an optional file plus the environment
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }
        let mut config: BatchConfig = builder
            .add_source(
                config::Environment::with_prefix("REVENUE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        // The conventional variable wins over the default, not over REVENUE_DATABASE__URL
        if std::env::var("REVENUE_DATABASE__URL").is_err() {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                config.database.url = url;
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BatchConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.actor, "remittance-import");
        assert!(!config.run_migrations);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config: BatchConfig = serde_json::from_str(
            r#"{
                "log_format": "json",
                "database": {"url": "postgres://db/revenue", "max_connections": 4},
                "engine": {"operation_timeout_ms": 5000}
            }"#,
        )
        .unwrap();

        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.database.url, "postgres://db/revenue");
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.engine.operation_timeout_ms, 5000);
        assert_eq!(config.actor, "remittance-import");
    }
}
