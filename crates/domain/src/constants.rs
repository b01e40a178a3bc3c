//! Domain constants
//!
//! Centralized location for limits and defaults shared by every crate.

/// Smallest valid Discord snowflake
pub const SNOWFLAKE_MIN: u64 = 1;
/// Largest snowflake that fits a signed SQLite INTEGER
pub const SNOWFLAKE_MAX: u64 = i64::MAX as u64;

/// Reserved top-level key of the flat JSON file holding document metadata
pub const METADATA_KEY: &str = "_metadata";

// Strict-validation limits (Discord embed limits)
pub const MAX_TITLE_LENGTH: usize = 256;
pub const MAX_DESCRIPTION_LENGTH: usize = 4096;
pub const MAX_REQUIRED_REACTIONS: usize = 20;

// Storage defaults
pub const DEFAULT_JSON_PATH: &str = "watched_reminders.json";
pub const DEFAULT_SQLITE_PATH: &str = "discord_bot.db";
pub const DEFAULT_POOL_SIZE: u32 = 5;
pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;

/// Minutes a flag in fallback must wait before a retry is allowed
pub const DEFAULT_FALLBACK_RETRY_MINUTES: i64 = 30;

/// Suffix used to tag backups taken by a rollback
pub const ROLLBACK_BACKUP_TAG: &str = "rollback";

/// Returns true if `id` is a snowflake storable as an SQLite INTEGER
pub const fn is_valid_snowflake(id: u64) -> bool {
    id >= SNOWFLAKE_MIN && id <= SNOWFLAKE_MAX
}
