//! Runtime feature flag state
//!
//! One manager per process, shared as `Arc<FeatureFlagManager>`. The initial
//! enabled bits come from [`FeatureFlagConfig`]; afterwards only explicit
//! `enable`/`disable` calls and fallbacks change state.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use reminder_domain::constants::DEFAULT_FALLBACK_RETRY_MINUTES;
use reminder_domain::FeatureFlagConfig;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::rules::{cascade_for, CascadeAction, CascadeRule, CASCADE_RULES};
use super::{FeatureFlag, FlagState};

/// Why and when a flag entered fallback
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackInfo {
    pub reason: String,
    pub at: Option<DateTime<Utc>>,
}

/// Per-flag entry of a [`FlagSummary`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagStatus {
    pub enabled: bool,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackInfo>,
}

/// Serializable snapshot for status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagSummary {
    pub flags: BTreeMap<FeatureFlag, FlagStatus>,
    pub active_count: usize,
    pub fallback_count: usize,
}

/// Thread-safe flag registry with cascading fallback
pub struct FeatureFlagManager {
    flags: RwLock<HashMap<FeatureFlag, FlagState>>,
    rules: &'static [CascadeRule],
}

impl FeatureFlagManager {
    pub fn new(config: &FeatureFlagConfig) -> Self {
        let flags = FeatureFlag::ALL
            .into_iter()
            .map(|flag| (flag, FlagState::new(configured(config, flag))))
            .collect();
        Self { flags: RwLock::new(flags), rules: CASCADE_RULES }
    }

    /// Replace the cascade table
    pub fn with_rules(mut self, rules: &'static [CascadeRule]) -> Self {
        self.rules = rules;
        self
    }

    /// Enabled and not in fallback
    pub fn is_enabled(&self, flag: FeatureFlag) -> bool {
        self.flags.read().get(&flag).is_some_and(FlagState::is_active)
    }

    pub fn state(&self, flag: FeatureFlag) -> FlagState {
        self.flags.read().get(&flag).cloned().unwrap_or_default()
    }

    /// Set the enabled bit and clear any fallback
    pub fn enable(&self, flag: FeatureFlag, reason: &str) {
        let mut flags = self.flags.write();
        let state = flags.entry(flag).or_default();
        state.enabled = true;
        state.fallback_reason = None;
        state.fallback_at = None;
        info!(flag = %flag, reason, "Feature flag enabled");
    }

    /// Clear the enabled bit, recording why
    pub fn disable(&self, flag: FeatureFlag, reason: &str) {
        let mut flags = self.flags.write();
        let state = flags.entry(flag).or_default();
        state.enabled = false;
        state.fallback_reason = Some(reason.to_string());
        state.fallback_at = Some(Utc::now());
        info!(flag = %flag, reason, "Feature flag disabled");
    }

    /// Put `flag` into fallback and apply its cascade
    ///
    /// Returns `false` without changing anything when `AutoFallback` is not
    /// active.
    pub fn trigger_fallback(&self, flag: FeatureFlag, reason: &str) -> bool {
        self.trigger_fallback_at(flag, reason, Utc::now())
    }

    pub fn trigger_fallback_at(&self, flag: FeatureFlag, reason: &str, at: DateTime<Utc>) -> bool {
        let mut flags = self.flags.write();

        let auto_fallback =
            flags.get(&FeatureFlag::AutoFallback).is_some_and(FlagState::is_active);
        if !auto_fallback {
            warn!(flag = %flag, reason, "Auto fallback disabled; ignoring fallback request");
            return false;
        }

        record_fallback(&mut flags, flag, reason, at);
        warn!(flag = %flag, reason, "Feature flag fell back");

        let mut visited = BTreeSet::from([flag]);
        self.cascade(&mut flags, flag, flag, reason, at, &mut visited);
        true
    }

    fn cascade(
        &self,
        flags: &mut HashMap<FeatureFlag, FlagState>,
        root: FeatureFlag,
        trigger: FeatureFlag,
        reason: &str,
        at: DateTime<Utc>,
        visited: &mut BTreeSet<FeatureFlag>,
    ) {
        for action in cascade_for(self.rules, trigger) {
            let target = action.target();
            if !visited.insert(target) {
                continue;
            }
            match action {
                CascadeAction::Fallback(_) => {
                    let cascaded = format!("cascade from {root}: {reason}");
                    record_fallback(flags, target, &cascaded, at);
                    warn!(flag = %target, root = %root, reason, "Cascading fallback");
                    self.cascade(flags, root, target, reason, at, visited);
                }
                CascadeAction::ForceEnable(_) => {
                    let state = flags.entry(target).or_default();
                    state.enabled = true;
                    state.fallback_reason = None;
                    state.fallback_at = None;
                    warn!(flag = %target, root = %root, reason, "Cascade force-enabled flag");
                }
            }
        }
    }

    /// Clear a fallback without touching the enabled bit
    pub fn clear_fallback(&self, flag: FeatureFlag) -> bool {
        let mut flags = self.flags.write();
        let Some(state) = flags.get_mut(&flag) else {
            return false;
        };
        let cleared = state.fallback_reason.take().is_some();
        state.fallback_at = None;
        if cleared {
            info!(flag = %flag, "Feature flag fallback cleared");
        }
        cleared
    }

    /// True when `flag` is not in fallback or its fallback is older than
    /// `delay_minutes`
    pub fn can_retry(&self, flag: FeatureFlag, delay_minutes: Option<i64>) -> bool {
        let delay = Duration::minutes(delay_minutes.unwrap_or(DEFAULT_FALLBACK_RETRY_MINUTES));
        self.can_retry_at(flag, delay, Utc::now())
    }

    pub fn can_retry_at(&self, flag: FeatureFlag, delay: Duration, now: DateTime<Utc>) -> bool {
        let flags = self.flags.read();
        let Some(state) = flags.get(&flag) else {
            return true;
        };
        if !state.in_fallback() {
            return true;
        }
        let ready = state.fallback_at.map_or(true, |at| now - at >= delay);
        debug!(flag = %flag, ready, "Fallback retry check");
        ready
    }

    /// Flags currently in fallback
    pub fn get_fallback_flags(&self) -> BTreeMap<FeatureFlag, FallbackInfo> {
        self.flags
            .read()
            .iter()
            .filter_map(|(flag, state)| {
                state.fallback_reason.as_ref().map(|reason| {
                    (*flag, FallbackInfo { reason: reason.clone(), at: state.fallback_at })
                })
            })
            .collect()
    }

    pub fn summary(&self) -> FlagSummary {
        let flags: BTreeMap<FeatureFlag, FlagStatus> = self
            .flags
            .read()
            .iter()
            .map(|(flag, state)| {
                let fallback = state
                    .fallback_reason
                    .as_ref()
                    .map(|reason| FallbackInfo { reason: reason.clone(), at: state.fallback_at });
                (*flag, FlagStatus { enabled: state.enabled, active: state.is_active(), fallback })
            })
            .collect();

        let active_count = flags.values().filter(|s| s.active).count();
        let fallback_count = flags.values().filter(|s| s.fallback.is_some()).count();
        FlagSummary { flags, active_count, fallback_count }
    }
}

impl Default for FeatureFlagManager {
    fn default() -> Self {
        Self::new(&FeatureFlagConfig::default())
    }
}

fn record_fallback(
    flags: &mut HashMap<FeatureFlag, FlagState>,
    flag: FeatureFlag,
    reason: &str,
    at: DateTime<Utc>,
) {
    let state = flags.entry(flag).or_default();
    state.fallback_reason = Some(reason.to_string());
    state.fallback_at = Some(at);
}

fn configured(config: &FeatureFlagConfig, flag: FeatureFlag) -> bool {
    match flag {
        FeatureFlag::SqliteStorage => config.sqlite_storage,
        FeatureFlag::SqliteMigration => config.sqlite_migration,
        FeatureFlag::SqliteScheduler => config.sqlite_scheduler,
        FeatureFlag::SqliteConcurrency => config.sqlite_concurrency,
        FeatureFlag::SqliteMonitoring => config.sqlite_monitoring,
        FeatureFlag::SqliteBackup => config.sqlite_backup,
        FeatureFlag::AutoFallback => config.auto_fallback,
        FeatureFlag::DegradedMode => config.degraded_mode,
        FeatureFlag::StrictValidation => config.strict_validation,
    }
}
