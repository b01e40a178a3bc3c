//! Feature flags gating the SQLite rollout
//!
//! A flag is active only when its enabled bit is set and no fallback reason
//! is recorded. Fallback is how runtime failures switch capabilities off
//! without losing the operator's configured intent.

pub mod manager;
pub mod rules;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use reminder_domain::ReminderError;
use serde::{Deserialize, Serialize};

pub use manager::{FallbackInfo, FeatureFlagManager, FlagStatus, FlagSummary};
pub use rules::{cascade_for, CascadeAction, CascadeRule, CASCADE_RULES};

/// Storage feature flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureFlag {
    SqliteStorage,
    SqliteMigration,
    SqliteScheduler,
    SqliteConcurrency,
    SqliteMonitoring,
    SqliteBackup,
    AutoFallback,
    DegradedMode,
    StrictValidation,
}

impl FeatureFlag {
    pub const ALL: [FeatureFlag; 9] = [
        Self::SqliteStorage,
        Self::SqliteMigration,
        Self::SqliteScheduler,
        Self::SqliteConcurrency,
        Self::SqliteMonitoring,
        Self::SqliteBackup,
        Self::AutoFallback,
        Self::DegradedMode,
        Self::StrictValidation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqliteStorage => "sqlite_storage",
            Self::SqliteMigration => "sqlite_migration",
            Self::SqliteScheduler => "sqlite_scheduler",
            Self::SqliteConcurrency => "sqlite_concurrency",
            Self::SqliteMonitoring => "sqlite_monitoring",
            Self::SqliteBackup => "sqlite_backup",
            Self::AutoFallback => "auto_fallback",
            Self::DegradedMode => "degraded_mode",
            Self::StrictValidation => "strict_validation",
        }
    }

    /// Environment variable that sets the initial enabled bit
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::SqliteStorage => "USE_SQLITE_STORAGE",
            Self::SqliteMigration => "ENABLE_SQLITE_MIGRATION",
            Self::SqliteScheduler => "ENABLE_SQLITE_SCHEDULER",
            Self::SqliteConcurrency => "ENABLE_SQLITE_CONCURRENCY",
            Self::SqliteMonitoring => "ENABLE_SQLITE_MONITORING",
            Self::SqliteBackup => "ENABLE_SQLITE_BACKUP",
            Self::AutoFallback => "ENABLE_AUTO_FALLBACK",
            Self::DegradedMode => "ENABLE_DEGRADED_MODE",
            Self::StrictValidation => "STRICT_VALIDATION",
        }
    }
}

impl fmt::Display for FeatureFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureFlag {
    type Err = ReminderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|flag| flag.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ReminderError::InvalidInput(format!("unknown feature flag: {s}")))
    }
}

/// Stored state of one flag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagState {
    pub enabled: bool,
    pub fallback_reason: Option<String>,
    pub fallback_at: Option<DateTime<Utc>>,
}

impl FlagState {
    pub fn new(enabled: bool) -> Self {
        Self { enabled, fallback_reason: None, fallback_at: None }
    }

    /// Enabled and not in fallback
    pub fn is_active(&self) -> bool {
        self.enabled && self.fallback_reason.is_none()
    }

    pub fn in_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flag_names() {
        assert_eq!("sqlite_storage".parse::<FeatureFlag>().ok(), Some(FeatureFlag::SqliteStorage));
        assert_eq!(
            " STRICT_VALIDATION ".parse::<FeatureFlag>().ok(),
            Some(FeatureFlag::StrictValidation)
        );
        assert!("sqlite".parse::<FeatureFlag>().is_err());
    }

    #[test]
    fn fallback_reason_overrides_enabled_bit() {
        let mut state = FlagState::new(true);
        assert!(state.is_active());
        state.fallback_reason = Some("disk full".into());
        assert!(!state.is_active());
    }
}
