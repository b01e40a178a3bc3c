//! Configuration loader
//!
//! Loads application configuration from a file and/or environment variables.
//!
//! ## Loading Strategy
//! 1. `REMINDER_CONFIG` names a file explicitly
//! 2. Otherwise probe the standard locations for a config file
//! 3. With no file, start from defaults
//! 4. Environment overrides are applied last in every case
//!
//! ## Environment Variables
//! - `REMINDER_JSON_PATH`: flat JSON file
//! - `REMINDER_SQLITE_PATH`: SQLite database file
//! - `REMINDER_DB_POOL_SIZE`: connection pool size
//! - `REMINDER_BACKUP_DIR`: backup directory
//! - `REMINDER_DEBOUNCE_MS`: reaction update quiet period
//! - `REMINDER_FALLBACK_RETRY_MINUTES`: cooldown before SQLite is retried
//! - `REMINDER_LOG_LEVEL` / `REMINDER_LOG_FORMAT`: logging (`pretty` or `json`)
//! - Feature flags: `USE_SQLITE_STORAGE`, `ENABLE_SQLITE_MIGRATION`,
//!   `ENABLE_SQLITE_SCHEDULER`, `ENABLE_SQLITE_CONCURRENCY`,
//!   `ENABLE_SQLITE_MONITORING`, `ENABLE_SQLITE_BACKUP`,
//!   `ENABLE_AUTO_FALLBACK`, `ENABLE_DEGRADED_MODE`, `STRICT_VALIDATION`
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.toml` or `./config.json`
//! 2. `./reminder.toml` or `./reminder.json`
//! 3. The same names next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;

use reminder_core::FeatureFlag;
use reminder_domain::{Config, FeatureFlagConfig, LogFormat, ReminderError, Result};

/// Explicit config file location
pub const CONFIG_PATH_ENV: &str = "REMINDER_CONFIG";

/// Load configuration: file when one is found, defaults otherwise, then
/// environment overrides
///
/// # Errors
/// Returns `ReminderError::Config` if a named file is missing, a file cannot
/// be parsed, or an environment variable holds an invalid value.
pub fn load() -> Result<Config> {
    let explicit = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
    let mut config = match explicit.or_else(probe_config_paths) {
        Some(path) => load_from_file(Some(path))?,
        None => {
            tracing::debug!("No config file found, using defaults");
            Config::default()
        }
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Defaults plus environment overrides
///
/// # Errors
/// Returns `ReminderError::Config` when a variable has an invalid value.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();
    apply_env_overrides(&mut config)?;
    tracing::info!("Configuration loaded from environment variables");
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Format is detected by
/// extension (`.json` or `.toml`). Missing sections take their defaults.
///
/// # Errors
/// Returns `ReminderError::Config` if the file is missing or invalid.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ReminderError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            ReminderError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| ReminderError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| ReminderError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| ReminderError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(ReminderError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations
pub fn probe_config_paths() -> Option<PathBuf> {
    const NAMES: [&str; 4] = ["config.toml", "config.json", "reminder.toml", "reminder.json"];

    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(NAMES.iter().map(|name| cwd.join(name)));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(NAMES.iter().map(|name| exe_dir.join(name)));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Apply every `REMINDER_*` and feature flag variable that is set
///
/// # Errors
/// Returns `ReminderError::Config` for unparseable values.
pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    let storage = &mut config.storage;
    if let Some(path) = env_opt("REMINDER_JSON_PATH") {
        storage.json_path = PathBuf::from(path);
    }
    if let Some(path) = env_opt("REMINDER_SQLITE_PATH") {
        storage.sqlite_path = PathBuf::from(path);
    }
    if let Some(size) = env_parse::<u32>("REMINDER_DB_POOL_SIZE")? {
        storage.pool_size = size;
    }
    if let Some(dir) = env_opt("REMINDER_BACKUP_DIR") {
        storage.backup_dir = Some(PathBuf::from(dir));
    }
    if let Some(ms) = env_parse::<u64>("REMINDER_DEBOUNCE_MS")? {
        storage.debounce_ms = ms;
    }
    if let Some(minutes) = env_parse::<i64>("REMINDER_FALLBACK_RETRY_MINUTES")? {
        storage.fallback_retry_minutes = minutes;
    }

    if let Some(level) = env_opt("REMINDER_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(format) = env_opt("REMINDER_LOG_FORMAT") {
        config.logging.format = match format.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" | "text" => LogFormat::Pretty,
            other => {
                return Err(ReminderError::Config(format!("Invalid log format: {other}")));
            }
        };
    }

    for flag in FeatureFlag::ALL {
        if let Some(enabled) = env_bool(flag.env_var()) {
            *flag_field(&mut config.feature_flags, flag) = enabled;
        }
    }

    Ok(())
}

fn flag_field(flags: &mut FeatureFlagConfig, flag: FeatureFlag) -> &mut bool {
    match flag {
        FeatureFlag::SqliteStorage => &mut flags.sqlite_storage,
        FeatureFlag::SqliteMigration => &mut flags.sqlite_migration,
        FeatureFlag::SqliteScheduler => &mut flags.sqlite_scheduler,
        FeatureFlag::SqliteConcurrency => &mut flags.sqlite_concurrency,
        FeatureFlag::SqliteMonitoring => &mut flags.sqlite_monitoring,
        FeatureFlag::SqliteBackup => &mut flags.sqlite_backup,
        FeatureFlag::AutoFallback => &mut flags.auto_fallback,
        FeatureFlag::DegradedMode => &mut flags.degraded_mode,
        FeatureFlag::StrictValidation => &mut flags.strict_validation,
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ReminderError::Config(format!("Invalid value for {key}: {e}")))
        })
        .transpose()
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive).
/// Returns `None` when the variable is unset.
fn env_bool(key: &str) -> Option<bool> {
    env_opt(key).map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}
