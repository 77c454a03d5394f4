//! Configuration for the sync runtime.

use crate::error::ConfigError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default number of failed attempts before an operation is marked failed.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default period of the background drain.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Failed attempts before an operation stops retrying automatically
    pub max_retries: u32,
    /// Period of the timer-driven drain
    pub sync_interval: Duration,
    /// Queue writes locally when the remote is unreachable instead of failing
    pub offline_mode: bool,
    /// Default freshness of cached reads
    pub cache_ttl: Duration,
    /// Maximum cached entries, zero for unbounded
    pub cache_capacity: usize,
    /// Actions kept in the store history
    pub history_limit: usize,
    /// Directory used by the file-backed durable store
    pub storage_dir: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            offline_mode: true,
            cache_ttl: Duration::from_millis(harbor_engine::cache::DEFAULT_TTL_MS),
            cache_capacity: harbor_engine::cache::DEFAULT_CAPACITY,
            history_limit: harbor_engine::store::DEFAULT_HISTORY_LIMIT,
            storage_dir: PathBuf::from(".harbor"),
        }
    }
}

impl SyncConfig {
    /// Load configuration from `HARBOR_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_retries = parse_var("HARBOR_MAX_RETRIES")?.unwrap_or(defaults.max_retries);

        let sync_interval = parse_var::<u64>("HARBOR_SYNC_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.sync_interval);

        let offline_mode = match env::var("HARBOR_OFFLINE_MODE") {
            Ok(value) => parse_bool("HARBOR_OFFLINE_MODE", &value)?,
            Err(_) => defaults.offline_mode,
        };

        let cache_ttl = parse_var::<u64>("HARBOR_CACHE_TTL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.cache_ttl);

        let cache_capacity =
            parse_var("HARBOR_CACHE_CAPACITY")?.unwrap_or(defaults.cache_capacity);

        let history_limit = parse_var("HARBOR_HISTORY_LIMIT")?.unwrap_or(defaults.history_limit);

        let storage_dir = env::var("HARBOR_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage_dir);

        Ok(Self {
            max_retries,
            sync_interval,
            offline_mode,
            cache_ttl,
            cache_capacity,
            history_limit,
            storage_dir,
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn with_offline_mode(mut self, enabled: bool) -> Self {
        self.offline_mode = enabled;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    /// Cache TTL in milliseconds, as the engine cache expects it.
    pub fn cache_ttl_millis(&self) -> u64 {
        self.cache_ttl.as_millis() as u64
    }
}

fn parse_var<T: FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
        Err(_) => Ok(None),
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
        }),
    }
}
