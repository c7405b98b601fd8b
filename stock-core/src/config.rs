//! Configuration for the inventory core

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Inventory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Item actor configuration
    pub actors: ActorConfig,

    /// Item defaults
    pub items: ItemDefaults,

    /// History configuration
    pub history: HistoryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/stocksense"),
            service_name: "stock-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            rocksdb: RocksDBConfig::default(),
            actors: ActorConfig::default(),
            items: ItemDefaults::default(),
            history: HistoryConfig::default(),
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

    /// fsync the WAL on every commit
    pub sync_writes: bool,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 16,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            sync_writes: true,
            enable_statistics: false,
        }
    }
}

/// Item actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Bounded mailbox capacity per item
    pub mailbox_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 64,
        }
    }
}

/// Defaults applied at item creation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemDefaults {
    /// Restock threshold when none is given
    pub min_threshold: i64,

    /// Advisory ceiling when none is given
    pub max_ceiling: i64,
}

impl Default for ItemDefaults {
    fn default() -> Self {
        Self {
            min_threshold: 5,
            max_ceiling: 20,
        }
    }
}

/// Transaction history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Records returned when no limit is given
    pub default_limit: usize,

    /// Upper bound on any requested limit
    pub max_limit: usize,

    /// Window counted as "recent" in stats (days)
    pub recent_window_days: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 1_000,
            recent_window_days: 7,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("STOCK_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(capacity) = std::env::var("STOCK_MAILBOX_CAPACITY") {
            config.actors.mailbox_capacity = capacity.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid STOCK_MAILBOX_CAPACITY: {}", e))
            })?;
        }

        if let Ok(limit) = std::env::var("STOCK_HISTORY_LIMIT") {
            config.history.default_limit = limit.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid STOCK_HISTORY_LIMIT: {}", e))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency
    pub fn validate(&self) -> crate::Result<()> {
        if self.actors.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "actors.mailbox_capacity must be positive".to_string(),
            ));
        }
        if self.history.default_limit > self.history.max_limit {
            return Err(crate::Error::Config(format!(
                "history.default_limit {} exceeds history.max_limit {}",
                self.history.default_limit, self.history.max_limit
            )));
        }
        crate::types::validate_thresholds(self.items.min_threshold, self.items.max_ceiling)
            .map_err(|e| crate::Error::Config(format!("items: {}", e)))
    }
}
