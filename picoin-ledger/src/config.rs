//! Configuration for the wallet ledger

use crate::ids::IdFormat;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Storage backend selection
    pub storage: StorageConfig,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Coin policy (bonuses, leveling)
    pub policy: PolicyConfig,

    /// Rate limiting
    pub rate_limit: RateLimitConfig,

    /// Wallet locking
    pub locking: LockConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/picoin"),
            service_name: "picoin-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            storage: StorageConfig::default(),
            rocksdb: RocksDBConfig::default(),
            policy: PolicyConfig::default(),
            rate_limit: RateLimitConfig::default(),
            locking: LockConfig::default(),
        }
    }
}

/// Storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-process map (lost on restart)
    Memory,
    /// RocksDB under `data_dir`
    RocksDb,
}

impl StorageBackend {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Some(StorageBackend::Memory),
            "rocksdb" => Some(StorageBackend::RocksDb),
            _ => None,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend
    pub backend: StorageBackend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::RocksDb,
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Fsync every commit
    pub sync_writes: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 3,
            max_background_jobs: 2,
            sync_writes: true,
        }
    }
}

/// Coin policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Coins credited when a wallet is created
    pub welcome_bonus: Decimal,

    /// Level N is left once total earned reaches `N * level_threshold_step`
    pub level_threshold_step: Decimal,

    /// Reaching level N pays `N * level_bonus_step`
    pub level_bonus_step: Decimal,

    /// Upper bound on level-ups applied by a single operation
    pub max_level_ups_per_operation: u32,

    /// Transaction id format
    pub id_format: IdFormat,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            welcome_bonus: Decimal::from(50),
            level_threshold_step: Decimal::from(100),
            level_bonus_step: Decimal::from(10),
            max_level_ups_per_operation: 10,
            id_format: IdFormat::Uuid,
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Mutating operations admitted per window, per user
    pub max_transactions: usize,

    /// Sliding window length (milliseconds)
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_transactions: 10,
            window_ms: 60_000, // 1 minute
        }
    }
}

impl RateLimitConfig {
    /// Window as a duration
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Wallet lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Maximum wait for a wallet lock before failing with `Busy` (milliseconds)
    pub acquire_timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: 2_000,
        }
    }
}

impl LockConfig {
    /// Timeout as a duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse from TOML text
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("PICOIN_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(backend) = std::env::var("PICOIN_STORAGE") {
            config.storage.backend = StorageBackend::parse(&backend).ok_or_else(|| {
                crate::Error::Config(format!("Unknown storage backend: {}", backend))
            })?;
        }

        if let Ok(max) = std::env::var("PICOIN_RATE_LIMIT_MAX") {
            config.rate_limit.max_transactions = parse_env("PICOIN_RATE_LIMIT_MAX", &max)?;
        }

        if let Ok(window) = std::env::var("PICOIN_RATE_LIMIT_WINDOW_MS") {
            config.rate_limit.window_ms = parse_env("PICOIN_RATE_LIMIT_WINDOW_MS", &window)?;
        }

        if let Ok(timeout) = std::env::var("PICOIN_LOCK_TIMEOUT_MS") {
            config.locking.acquire_timeout_ms = parse_env("PICOIN_LOCK_TIMEOUT_MS", &timeout)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.policy.welcome_bonus < Decimal::ZERO {
            return Err(crate::Error::Config(
                "policy.welcome_bonus must not be negative".to_string(),
            ));
        }
        if self.policy.level_threshold_step <= Decimal::ZERO {
            return Err(crate::Error::Config(
                "policy.level_threshold_step must be positive".to_string(),
            ));
        }
        if self.policy.level_bonus_step < Decimal::ZERO {
            return Err(crate::Error::Config(
                "policy.level_bonus_step must not be negative".to_string(),
            ));
        }
        if self.rate_limit.window_ms == 0 {
            return Err(crate::Error::Config(
                "rate_limit.window_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> crate::Result<T> {
    value
        .parse()
        .map_err(|_| crate::Error::Config(format!("Invalid value for {}: {}", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "picoin-ledger");
        assert_eq!(config.policy.welcome_bonus, Decimal::from(50));
        assert_eq!(config.rate_limit.max_transactions, 10);
        assert_eq!(config.rate_limit.window(), Duration::from_secs(60));
        assert_eq!(config.storage.backend, StorageBackend::RocksDb);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            data_dir = "/tmp/picoin"

            [storage]
            backend = "memory"

            [rate_limit]
            max_transactions = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/picoin"));
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.rate_limit.max_transactions, 3);
        assert_eq!(config.rate_limit.window_ms, 60_000);
        assert_eq!(config.policy.max_level_ups_per_operation, 10);
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let result = Config::from_toml(
            r#"
            [policy]
            level_threshold_step = "0"
            "#,
        );
        assert!(matches!(result, Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!(StorageBackend::parse("RocksDB"), Some(StorageBackend::RocksDb));
        assert_eq!(StorageBackend::parse("memory"), Some(StorageBackend::Memory));
        assert_eq!(StorageBackend::parse("mongo"), None);
    }
}
