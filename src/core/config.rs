//! Configuration for storage, the remote tile provider, the region downloader
//! and the tile cache.
//!
//! Every section has sensible defaults and a few named presets; a JSON file can
//! override any subset of fields.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::constants::{
    ACCESS_TOKEN_ENV, DEFAULT_CACHE_MAX_BYTES, DEFAULT_MEMORY_TILES, DEFAULT_REQUEST_INTERVAL_MS,
    DEFAULT_TILE_MAX_AGE_DAYS, DEFAULT_TILE_URL_TEMPLATE,
};
use crate::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    pub storage: StorageConfig,
    pub provider: ProviderConfig,
    pub downloader: DownloaderConfig,
    pub cache: CacheConfig,
}

impl FieldConfig {
    /// Loads a JSON config file and applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut config: FieldConfig = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("invalid config {}: {e}", path.display())))?;
        config.apply_env();
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Defaults plus environment overrides, used when no file is given.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            if !token.is_empty() {
                self.provider.access_token = token;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the `tracks/`, `tiles/` and `regions/` collections
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("fieldmap-data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// URL with `{z}`, `{x}`, `{y}` and `{token}` placeholders
    pub url_template: String,
    pub access_token: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_TILE_URL_TEMPLATE.to_string(),
            access_token: String::new(),
            user_agent: concat!("fieldmap/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 10,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Configuration for the region downloader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    /// Pause after every network fetch
    pub request_interval_ms: u64,
    /// Maximum concurrent tile downloads (1 keeps downloads sequential)
    pub max_concurrent: usize,
    /// Extra attempts per tile after the first failure
    pub max_retries: usize,
    /// Delay before the first retry
    pub retry_delay_ms: u64,
    /// Double the retry delay on every further attempt
    pub exponential_backoff: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            request_interval_ms: DEFAULT_REQUEST_INTERVAL_MS,
            max_concurrent: 1,
            max_retries: 2,
            retry_delay_ms: 500,
            exponential_backoff: true,
        }
    }
}

impl DownloaderConfig {
    pub fn low_resource() -> Self {
        Self {
            request_interval_ms: 250,
            max_concurrent: 1,
            max_retries: 1,
            retry_delay_ms: 1_000,
            exponential_backoff: false,
        }
    }

    pub fn high_throughput() -> Self {
        Self {
            request_interval_ms: 25,
            max_concurrent: 4,
            max_retries: 3,
            retry_delay_ms: 250,
            exponential_backoff: true,
        }
    }

    pub fn for_testing() -> Self {
        Self {
            request_interval_ms: 0,
            max_concurrent: 1,
            max_retries: 0,
            retry_delay_ms: 0,
            exponential_backoff: false,
        }
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: usize) -> Duration {
        let base = Duration::from_millis(self.retry_delay_ms);
        if self.exponential_backoff && attempt > 1 {
            let factor = 1u32 << (attempt - 1).min(16) as u32;
            base.saturating_mul(factor)
        } else {
            base
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Disk budget enforced by `TileStore::evict_to_budget`
    pub max_bytes: u64,
    /// Age after which `TileStore::clear_expired` drops a tile
    pub tile_max_age_days: u64,
    /// Decoded tiles kept in memory
    pub memory_tiles: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_CACHE_MAX_BYTES,
            tile_max_age_days: DEFAULT_TILE_MAX_AGE_DAYS,
            memory_tiles: DEFAULT_MEMORY_TILES,
        }
    }
}

impl CacheConfig {
    pub fn tile_max_age(&self) -> Duration {
        Duration::from_secs(self.tile_max_age_days * 24 * 60 * 60)
    }
}
