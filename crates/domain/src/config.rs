//! Configuration structures
//!
//! Loaded once at startup by the infra config loader (file and/or
//! environment) and passed down explicitly. Every section has serde defaults
//! so partial files are accepted.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DEBOUNCE_MS, DEFAULT_FALLBACK_RETRY_MINUTES, DEFAULT_JSON_PATH, DEFAULT_POOL_SIZE,
    DEFAULT_SQLITE_PATH,
};

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub feature_flags: FeatureFlagConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage locations and tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Flat JSON file
    pub json_path: PathBuf,
    /// SQLite database file
    pub sqlite_path: PathBuf,
    pub pool_size: u32,
    /// Directory for backups; siblings of the data files when unset
    pub backup_dir: Option<PathBuf>,
    /// Quiet period for debounced reaction updates
    pub debounce_ms: u64,
    /// Cooldown before a fallen-back flag may be retried
    pub fallback_retry_minutes: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            json_path: PathBuf::from(DEFAULT_JSON_PATH),
            sqlite_path: PathBuf::from(DEFAULT_SQLITE_PATH),
            pool_size: DEFAULT_POOL_SIZE,
            backup_dir: None,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            fallback_retry_minutes: DEFAULT_FALLBACK_RETRY_MINUTES,
        }
    }
}

/// Initial feature flag state
///
/// Every SQLite capability starts disabled; `auto_fallback` starts enabled so
/// a failing SQLite backend is abandoned automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlagConfig {
    pub sqlite_storage: bool,
    pub sqlite_migration: bool,
    pub sqlite_scheduler: bool,
    pub sqlite_concurrency: bool,
    pub sqlite_monitoring: bool,
    pub sqlite_backup: bool,
    pub auto_fallback: bool,
    pub degraded_mode: bool,
    pub strict_validation: bool,
}

impl Default for FeatureFlagConfig {
    fn default() -> Self {
        Self {
            sqlite_storage: false,
            sqlite_migration: false,
            sqlite_scheduler: false,
            sqlite_concurrency: false,
            sqlite_monitoring: false,
            sqlite_backup: false,
            auto_fallback: true,
            degraded_mode: false,
            strict_validation: false,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Pretty }
    }
}
