//! Configuration system for licensegate.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `LICENSEGATE_SERVER_HOST` - Server bind address
//! - `LICENSEGATE_SERVER_PORT` (or `PORT`) - Server port
//! - `LICENSEGATE_STORAGE_BACKEND` - `memory`, `json`, `sqlite` or `postgres`
//! - `LICENSEGATE_DATA_DIR` - Directory of the JSON-file store
//! - `LICENSEGATE_DATABASE_URL` - SQLite or PostgreSQL connection URL
//! - `LICENSEGATE_LICENSE_KEY_PREFIX` - License key prefix
//! - `LICENSEGATE_LOGGING_ENABLED` - Enable the tracing subscriber
//! - `LICENSEGATE_LOG_LEVEL` - Log level (trace, debug, info, warn, error)
//! - `LICENSEGATE_ADMIN_SECRET` (or `ADMIN_SECRET`) - Admin header secret
//! - `LICENSEGATE_BOOTSTRAP_LICENSE_KEY` - Fixed license ensured at startup

use config::Config;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::errors::{LicenseError, LicenseResult};

/// Global configuration, loaded once by the server binary.
static CONFIG: OnceLock<LicensegateConfig> = OnceLock::new();

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LicensegateConfig {
    pub server: ServerConfig,
    pub license: LicenseConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub admin: AdminConfig,
    pub bootstrap: BootstrapConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// License key generation configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Prefix for generated license keys (e.g., "MQL5" -> "MQL5-XXXX-...")
    pub key_prefix: String,
    /// Number of hex groups after the prefix
    pub key_segments: u8,
    /// Hex characters per group (must be even: each byte yields two)
    pub key_segment_length: u8,
    /// Candidates tried before giving up on a collision-free key
    pub max_key_attempts: u32,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            key_prefix: "MQL5".to_string(),
            key_segments: 6,
            key_segment_length: 4,
            max_key_attempts: 10,
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// "memory", "json", "sqlite" or "postgres"
    pub backend: String,
    /// Directory holding `licenses.json` and `logs.json`
    pub data_dir: PathBuf,
    /// SQLite connection URL
    pub sqlite_url: String,
    /// PostgreSQL connection URL
    pub postgres_url: String,
    /// Pool size for the SQL backends
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "json".to_string(),
            data_dir: PathBuf::from("./data"),
            sqlite_url: "sqlite://licensegate.db?mode=rwc".to_string(),
            postgres_url: "postgres://localhost/licensegate".to_string(),
            max_connections: 5,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Shared secret expected in the `X-Admin-Secret` header.
    /// Empty means the admin routes refuse every request.
    pub secret: String,
}

/// Fixed license ensured at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub license_key: Option<String>,
    pub max_accounts: u32,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            license_key: None,
            max_accounts: 999,
        }
    }
}

fn cfg_err(e: config::ConfigError) -> LicenseError {
    LicenseError::ConfigError(e.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl LicensegateConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` file (optional)
    /// 3. Environment variables
    pub fn load() -> LicenseResult<Self> {
        let database_url = env::var("LICENSEGATE_DATABASE_URL").ok();

        let builder = Config::builder()
            .set_default("server.host", "127.0.0.1")
            .map_err(cfg_err)?
            .set_default("server.port", 3000)
            .map_err(cfg_err)?
            .set_default("license.key_prefix", "MQL5")
            .map_err(cfg_err)?
            .set_default("license.key_segments", 6)
            .map_err(cfg_err)?
            .set_default("license.key_segment_length", 4)
            .map_err(cfg_err)?
            .set_default("license.max_key_attempts", 10)
            .map_err(cfg_err)?
            .set_default("storage.backend", "json")
            .map_err(cfg_err)?
            .set_default("storage.data_dir", "./data")
            .map_err(cfg_err)?
            .set_default("storage.sqlite_url", "sqlite://licensegate.db?mode=rwc")
            .map_err(cfg_err)?
            .set_default("storage.postgres_url", "postgres://localhost/licensegate")
            .map_err(cfg_err)?
            .set_default("storage.max_connections", 5)
            .map_err(cfg_err)?
            .set_default("logging.enabled", true)
            .map_err(cfg_err)?
            .set_default("logging.level", "info")
            .map_err(cfg_err)?
            .set_default("admin.secret", "")
            .map_err(cfg_err)?
            .set_default("bootstrap.max_accounts", 999)
            .map_err(cfg_err)?
            // Load from config.toml (optional)
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables
            .set_override_option("server.host", env::var("LICENSEGATE_SERVER_HOST").ok())
            .map_err(cfg_err)?
            .set_override_option(
                "server.port",
                env_parsed::<i64>("LICENSEGATE_SERVER_PORT").or_else(|| env_parsed::<i64>("PORT")),
            )
            .map_err(cfg_err)?
            .set_override_option(
                "license.key_prefix",
                env::var("LICENSEGATE_LICENSE_KEY_PREFIX").ok(),
            )
            .map_err(cfg_err)?
            .set_override_option(
                "storage.backend",
                env::var("LICENSEGATE_STORAGE_BACKEND").ok(),
            )
            .map_err(cfg_err)?
            .set_override_option("storage.data_dir", env::var("LICENSEGATE_DATA_DIR").ok())
            .map_err(cfg_err)?
            .set_override_option(
                "storage.sqlite_url",
                database_url
                    .clone()
                    .filter(|url| url.starts_with("sqlite")),
            )
            .map_err(cfg_err)?
            .set_override_option(
                "storage.postgres_url",
                database_url.filter(|url| url.starts_with("postgres")),
            )
            .map_err(cfg_err)?
            .set_override_option(
                "logging.enabled",
                env_parsed::<bool>("LICENSEGATE_LOGGING_ENABLED"),
            )
            .map_err(cfg_err)?
            .set_override_option("logging.level", env::var("LICENSEGATE_LOG_LEVEL").ok())
            .map_err(cfg_err)?
            .set_override_option(
                "admin.secret",
                env::var("LICENSEGATE_ADMIN_SECRET")
                    .or_else(|_| env::var("ADMIN_SECRET"))
                    .ok(),
            )
            .map_err(cfg_err)?
            .set_override_option(
                "bootstrap.license_key",
                env::var("LICENSEGATE_BOOTSTRAP_LICENSE_KEY").ok(),
            )
            .map_err(cfg_err)?;

        let settings = builder
            .build()
            .map_err(|e| LicenseError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| LicenseError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.server.port == 0 {
            return Err(LicenseError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        match self.storage.backend.as_str() {
            "memory" | "json" | "sqlite" | "postgres" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "storage.backend must be one of: memory, json, sqlite, postgres. Got '{other}'"
                )));
            }
        }

        if self.license.key_prefix.is_empty() {
            return Err(LicenseError::ConfigError(
                "license.key_prefix cannot be empty".to_string(),
            ));
        }
        if self.license.key_segments == 0 {
            return Err(LicenseError::ConfigError(
                "license.key_segments must be greater than 0".to_string(),
            ));
        }
        if self.license.key_segment_length == 0 || self.license.key_segment_length % 2 != 0 {
            return Err(LicenseError::ConfigError(
                "license.key_segment_length must be a positive even number".to_string(),
            ));
        }
        if self.license.max_key_attempts == 0 {
            return Err(LicenseError::ConfigError(
                "license.max_key_attempts must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        if let Some(key) = &self.bootstrap.license_key {
            if key.trim().is_empty() {
                return Err(LicenseError::ConfigError(
                    "bootstrap.license_key cannot be blank".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> LicenseResult<&'static LicensegateConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = LicensegateConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is equivalent.
    let _ = CONFIG.set(config);

    CONFIG
        .get()
        .ok_or_else(|| LicenseError::ConfigError("configuration was not initialised".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = LicensegateConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.license.key_prefix, "MQL5");
        assert_eq!(config.license.key_segments, 6);
        assert_eq!(config.storage.backend, "json");
    }

    #[test]
    fn rejects_unknown_backend() {
        let mut config = LicensegateConfig::default();
        config.storage.backend = "mongodb".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("storage.backend"));
    }

    #[test]
    fn rejects_odd_segment_length() {
        let mut config = LicensegateConfig::default();
        config.license.key_segment_length = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_attempts_and_bad_level() {
        let mut config = LicensegateConfig::default();
        config.license.max_key_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = LicensegateConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_blank_bootstrap_key() {
        let mut config = LicensegateConfig::default();
        config.bootstrap.license_key = Some("  ".to_string());
        assert!(config.validate().is_err());
    }
}
