//! Cascade rules applied when a flag falls back
//!
//! The policy is data: each rule names a trigger flag and the actions applied
//! to other flags when the trigger enters fallback. The manager walks the
//! table recursively, visiting each flag at most once per trigger.

use super::FeatureFlag;

/// Effect of a cascade on a dependent flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeAction {
    /// Put the flag into fallback with a reason referencing the root cause
    Fallback(FeatureFlag),
    /// Enable the flag and clear any fallback it carries
    ForceEnable(FeatureFlag),
}

impl CascadeAction {
    pub fn target(&self) -> FeatureFlag {
        match self {
            Self::Fallback(flag) | Self::ForceEnable(flag) => *flag,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeRule {
    pub trigger: FeatureFlag,
    pub actions: &'static [CascadeAction],
}

/// SQLite storage failing takes every SQLite-dependent capability with it;
/// a failed migration switches the bot into degraded mode.
pub const CASCADE_RULES: &[CascadeRule] = &[
    CascadeRule {
        trigger: FeatureFlag::SqliteStorage,
        actions: &[
            CascadeAction::Fallback(FeatureFlag::SqliteScheduler),
            CascadeAction::Fallback(FeatureFlag::SqliteConcurrency),
            CascadeAction::Fallback(FeatureFlag::SqliteMonitoring),
            CascadeAction::Fallback(FeatureFlag::SqliteBackup),
        ],
    },
    CascadeRule {
        trigger: FeatureFlag::SqliteMigration,
        actions: &[CascadeAction::ForceEnable(FeatureFlag::DegradedMode)],
    },
];

/// Actions for `flag` in `rules`; empty when no rule matches
pub fn cascade_for(rules: &'static [CascadeRule], flag: FeatureFlag) -> &'static [CascadeAction] {
    rules.iter().find(|rule| rule.trigger == flag).map_or(&[], |rule| rule.actions)
}
