//! Pipeline configuration
//!
//! All connection parameters and storage identity live in one explicit value
//! constructed at startup and handed to the orchestrator; nothing reads the
//! process environment after load.

use pdp_common::{PdpError, Result};

use crate::db::DbConfig;
use crate::object_store::ObjectStoreConfig;

/// Default object-store prefix for quarantine records.
pub const DEFAULT_QUARANTINE_PREFIX: &str = "logs";

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct EtlConfig {
    pub database: DbConfig,
    pub object_store: ObjectStoreConfig,
    /// Object-store prefix under which quarantine records are written
    pub quarantine_prefix: String,
    /// Raw-document object keys to process when none are given explicitly
    pub raw_keys: Vec<String>,
}

impl EtlConfig {
    /// Load configuration from environment and defaults (`.env` honored).
    ///
    /// Environment variables:
    /// - `DATABASE_URL` (required), `DB_MAX_CONNECTIONS`,
    ///   `DB_MIN_CONNECTIONS`, `DB_CONNECT_TIMEOUT`, `DB_IDLE_TIMEOUT`
    /// - `S3_ENDPOINT`, `S3_REGION`, `S3_BUCKET`, `S3_ACCESS_KEY`,
    ///   `S3_SECRET_KEY`, `S3_PATH_STYLE`
    /// - `ETL_QUARANTINE_PREFIX` (default `logs`)
    /// - `ETL_RAW_KEYS` (comma-separated object keys)
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database: DbConfig::from_env().map_err(|e| PdpError::Config(e.to_string()))?,
            object_store: ObjectStoreConfig::from_env()
                .map_err(|e| PdpError::Config(e.to_string()))?,
            quarantine_prefix: std::env::var("ETL_QUARANTINE_PREFIX")
                .unwrap_or_else(|_| DEFAULT_QUARANTINE_PREFIX.to_string()),
            raw_keys: std::env::var("ETL_RAW_KEYS")
                .map(|keys| parse_raw_keys(&keys))
                .unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.object_store.bucket.is_empty() {
            return Err(PdpError::Config(
                "Object store bucket cannot be empty".to_string(),
            ));
        }

        if self.quarantine_prefix.trim_matches('/').is_empty() {
            return Err(PdpError::Config(
                "Quarantine prefix cannot be empty".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(PdpError::Config(
                "Database max_connections must be greater than 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(PdpError::Config(format!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        Ok(())
    }
}

/// Split a comma-separated key list, dropping empty segments.
fn parse_raw_keys(keys: &str) -> Vec<String> {
    keys.split(',')
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .collect()
}
