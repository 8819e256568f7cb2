use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::{setting_keys, Database, DatabaseError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
    #[error("Failed to read settings: {0}")]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub node: NodeConfig,
    pub limits: LimitsConfig,
    pub sweeper: SweeperConfig,
    /// Enables dangerous operations like purge. Must never be true in production.
    pub test_mode: bool,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
}

#[derive(Debug, Clone)]
pub struct LimitsConfig {
    /// Largest declared upload size accepted, in bytes
    pub max_file_size: u64,
    /// Bucket capacity used for usage percentages, in bytes
    pub total_storage: u64,
}

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub interval: Duration,
    /// Idle rate-limit entries older than this are pruned
    pub rate_limit_entry_ttl: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            data_dir: "./data".to_string(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size: 5 * 1024 * 1024 * 1024,  // 5GB
            total_storage: 10 * 1024 * 1024 * 1024, // 10GB
        }
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            rate_limit_entry_ttl: Duration::from_secs(3600),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = LimitsConfig::default();
        let sweeper_defaults = SweeperConfig::default();

        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let test_mode = std::env::var("TEST_MODE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let max_file_size = env_parse("MAX_FILE_SIZE").unwrap_or(defaults.max_file_size);
        let total_storage = env_parse("TOTAL_STORAGE").unwrap_or(defaults.total_storage);

        let interval = env_parse("SWEEP_INTERVAL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(sweeper_defaults.interval);
        let rate_limit_entry_ttl = env_parse("RATE_LIMIT_ENTRY_TTL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(sweeper_defaults.rate_limit_entry_ttl);

        let config = Config {
            node: NodeConfig {
                bind_address,
                data_dir,
            },
            limits: LimitsConfig {
                max_file_size,
                total_storage,
            },
            sweeper: SweeperConfig {
                interval,
                rate_limit_entry_ttl,
            },
            test_mode,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.node.data_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "DATA_DIR cannot be empty".to_string(),
            ));
        }

        if self.limits.max_file_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_FILE_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.sweeper.interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "SWEEP_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        if self.limits.total_storage < self.limits.max_file_size {
            tracing::warn!(
                "TOTAL_STORAGE ({}) is smaller than MAX_FILE_SIZE ({}). \
                 Usage percentages may exceed 100.",
                self.limits.total_storage,
                self.limits.max_file_size
            );
        }

        Ok(())
    }
}

/// Connection settings for the S3-compatible bucket. Entered through the
/// setup flow and persisted in the settings table, not the environment.
#[derive(Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Full endpoint URL, e.g. `https://<account>.r2.cloudflarestorage.com`
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
}

impl std::fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSettings")
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket_name", &self.bucket_name)
            .finish()
    }
}

impl StorageSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing: Vec<&str> = [
            ("endpoint", &self.endpoint),
            ("access_key_id", &self.access_key_id),
            ("secret_access_key", &self.secret_access_key),
            ("bucket_name", &self.bucket_name),
        ]
        .iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

        if !missing.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "missing storage settings: {}",
                missing.join(", ")
            )));
        }

        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ConfigError::ValidationError(
                "endpoint must be an http(s) URL".to_string(),
            ));
        }

        Ok(())
    }

    /// Load saved settings. `None` until the setup flow has completed.
    pub fn load(db: &Database) -> Result<Option<Self>, ConfigError> {
        if db.get_setting(setting_keys::STORAGE_CONFIGURED)?.as_deref() != Some("true") {
            return Ok(None);
        }

        let get = |key: &str| -> Result<String, ConfigError> {
            Ok(db.get_setting(key)?.unwrap_or_default())
        };

        Ok(Some(Self {
            endpoint: get(setting_keys::STORAGE_ENDPOINT)?,
            access_key_id: get(setting_keys::STORAGE_ACCESS_KEY_ID)?,
            secret_access_key: get(setting_keys::STORAGE_SECRET_ACCESS_KEY)?,
            bucket_name: get(setting_keys::STORAGE_BUCKET_NAME)?,
        }))
    }

    /// Validate and persist, marking storage as configured.
    pub fn save(&self, db: &Database) -> Result<(), ConfigError> {
        self.validate()?;
        db.set_settings(&[
            (setting_keys::STORAGE_ENDPOINT, self.endpoint.as_str()),
            (setting_keys::STORAGE_ACCESS_KEY_ID, self.access_key_id.as_str()),
            (
                setting_keys::STORAGE_SECRET_ACCESS_KEY,
                self.secret_access_key.as_str(),
            ),
            (setting_keys::STORAGE_BUCKET_NAME, self.bucket_name.as_str()),
            (setting_keys::STORAGE_CONFIGURED, "true"),
        ])?;
        Ok(())
    }
}
