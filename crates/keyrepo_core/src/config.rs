//! Configuration of a key repository.

use crate::error::{KeyRepoError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Name of the configuration file inside a repository root.
pub const CONFIG_FILE: &str = "config.toml";

/// Configuration for a key repository.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Interning pool sizing.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Unit open/close policy.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Diagnostic tracing switches.
    #[serde(default)]
    pub trace: TraceConfig,
}

impl Config {
    /// Load configuration from `<root>/config.toml`, or defaults if absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| KeyRepoError::ConfigError(format!("failed to read config: {}", e)))?;
            toml::from_str(&content)
                .map_err(|e| KeyRepoError::ConfigError(format!("failed to parse config: {}", e)))
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to `<root>/config.toml`.
    pub fn save(&self, root: &Path) -> Result<()> {
        let path = root.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self).map_err(|e| {
            KeyRepoError::ConfigError(format!("failed to serialize config: {}", e))
        })?;
        fs::write(&path, content)
            .map_err(|e| KeyRepoError::ConfigError(format!("failed to write config: {}", e)))?;
        Ok(())
    }

    /// Persistence version repositories opened with this config must carry.
    pub fn persistence_version(&self) -> i32 {
        crate::handler::persistence_version(self.storage.experimental)
    }
}

/// Interning pool sizing. Unset values are derived from the core count.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of shards; rounded up to a power of two.
    pub shards: Option<usize>,

    /// Initial capacity of each shard.
    pub shard_capacity: Option<usize>,

    /// Inserts into a shard between sweeps of dead entries
    /// (default: the shard capacity).
    pub sweep_threshold: Option<usize>,
}

/// Unit open/close policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Idle seconds before an implicitly opened unit is closed (default: 20).
    pub implicit_close_secs: u64,

    /// Close implicitly opened units at all (default: true).
    pub implicit_close_enabled: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            implicit_close_secs: 20,
            implicit_close_enabled: true,
        }
    }
}

impl LifecycleConfig {
    /// Returns the implicit close interval as a Duration.
    pub fn implicit_close_interval(&self) -> Duration {
        Duration::from_secs(self.implicit_close_secs)
    }
}

/// Storage backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Persist to disk; `false` keeps everything in memory (default: true).
    pub persistent: bool,

    /// Compression level for zstd (1-22, default: 3).
    /// Higher values mean better compression but slower performance.
    pub compression_level: i32,

    /// Experimental format; shifts the persistence version (default: false).
    pub experimental: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            persistent: true,
            compression_level: 3,
            experimental: false,
        }
    }
}

/// Diagnostic tracing switches.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TraceConfig {
    /// Log interning pool shard populations when the pool is disposed.
    pub pool_distribution: bool,

    /// Restrict per-key trace logging to keys whose name contains this.
    pub key_filter: Option<String>,
}
