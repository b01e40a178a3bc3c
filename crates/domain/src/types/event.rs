//! Watched events
//!
//! An [`Event`] is a Discord message the bot watches: members are expected to
//! react with one of `required_reactions`, and the bot reminds those who have
//! not every `interval_minutes`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::reaction::{Reaction, ReactionRecord};
use super::snowflake;
use crate::constants::{
    is_valid_snowflake, MAX_DESCRIPTION_LENGTH, MAX_REQUIRED_REACTIONS, MAX_TITLE_LENGTH,
};

/// A watched reminder event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(with = "snowflake")]
    pub message_id: u64,
    #[serde(with = "snowflake")]
    pub channel_id: u64,
    #[serde(with = "snowflake")]
    pub guild_id: u64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub interval_minutes: f64,
    #[serde(default)]
    pub is_paused: bool,
    pub last_reminder: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Emoji a member may react with to acknowledge; ordered, non-empty
    pub required_reactions: Vec<String>,
    #[serde(default)]
    pub reactions: Vec<ReactionRecord>,
    /// Members expected to react
    #[serde(default, with = "snowflake::vec")]
    pub all_users: Vec<u64>,
    /// Members known to have reacted
    #[serde(default, with = "snowflake::vec")]
    pub users_who_reacted: Vec<u64>,
}

impl Event {
    /// New unpaused event whose first reminder is due one interval from `now`
    pub fn new(
        message_id: u64,
        channel_id: u64,
        guild_id: u64,
        title: impl Into<String>,
        interval_minutes: f64,
        required_reactions: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id,
            channel_id,
            guild_id,
            title: title.into(),
            description: None,
            interval_minutes,
            is_paused: false,
            last_reminder: now,
            created_at: now,
            required_reactions,
            reactions: Vec::new(),
            all_users: Vec::new(),
            users_who_reacted: Vec::new(),
        }
    }

    /// Reminder interval at millisecond precision
    ///
    /// `None` when `interval_minutes` is not a positive duration that fits in
    /// a [`Duration`], which can only happen for a record that skipped
    /// validation.
    pub fn interval(&self) -> Option<Duration> {
        let millis = (self.interval_minutes * 60_000.0).round();
        if !millis.is_finite() || millis <= 0.0 || millis >= i64::MAX as f64 {
            return None;
        }
        Duration::try_milliseconds(millis as i64)
    }

    pub fn next_reminder_at(&self) -> Option<DateTime<Utc>> {
        self.last_reminder.checked_add_signed(self.interval()?)
    }

    /// Not paused and at least one interval has elapsed since the last
    /// reminder. An event without a usable interval is never due.
    pub fn is_due_for_reminder(&self, now: DateTime<Utc>) -> bool {
        !self.is_paused
            && self.interval().is_some_and(|interval| now - self.last_reminder >= interval)
    }

    pub fn mark_reminder_sent(&mut self, at: DateTime<Utc>) {
        self.last_reminder = at;
    }

    /// Replace the reaction set; one reaction per user, the last one wins
    pub fn set_reactions(&mut self, reactions: Vec<ReactionRecord>) {
        let mut deduped: Vec<ReactionRecord> = Vec::with_capacity(reactions.len());
        for reaction in reactions {
            if let Some(existing) = deduped.iter_mut().find(|r| r.user_id == reaction.user_id) {
                *existing = reaction;
            } else {
                deduped.push(reaction);
            }
        }
        self.users_who_reacted = deduped.iter().map(|r| r.user_id).collect();
        self.reactions = deduped;
    }

    /// Every user id referenced by this event (expected, reacted, reactions)
    pub fn referenced_user_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .all_users
            .iter()
            .chain(self.users_who_reacted.iter())
            .copied()
            .chain(self.reactions.iter().map(|r| r.user_id))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Expected members who have not reacted yet
    pub fn missing_users(&self) -> Vec<u64> {
        let reacted = self.referenced_reacted();
        self.all_users.iter().copied().filter(|id| !reacted.contains(id)).collect()
    }

    fn referenced_reacted(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .users_who_reacted
            .iter()
            .copied()
            .chain(self.reactions.iter().map(|r| r.user_id))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Relational reaction rows for this event
    pub fn reaction_rows(&self) -> Vec<Reaction> {
        self.reactions
            .iter()
            .map(|r| Reaction {
                event_id: self.message_id,
                user_id: r.user_id,
                emoji: r.emoji.clone(),
                reacted_at: r.reacted_at,
            })
            .collect()
    }

    /// Invariant violations; empty when the event is storable
    ///
    /// Ids, interval and reactions are always checked. `strict` adds the
    /// title and length limits.
    pub fn validation_errors(&self, strict: bool) -> Vec<String> {
        let mut errors = Vec::new();
        let id = self.message_id;

        for (field, value) in [
            ("message_id", self.message_id),
            ("channel_id", self.channel_id),
            ("guild_id", self.guild_id),
        ] {
            if !is_valid_snowflake(value) {
                errors.push(format!("event {id}: {field} {value} is outside the snowflake range"));
            }
        }
        if !self.interval_minutes.is_finite() || self.interval_minutes <= 0.0 {
            errors.push(format!(
                "event {id}: interval_minutes must be > 0 (got {})",
                self.interval_minutes
            ));
        }
        if self.required_reactions.is_empty() {
            errors.push(format!("event {id}: required_reactions must not be empty"));
        }
        for user_id in self.referenced_user_ids() {
            if !is_valid_snowflake(user_id) {
                errors.push(format!("event {id}: user id {user_id} is outside the snowflake range"));
            }
        }

        if strict {
            if self.title.trim().is_empty() {
                errors.push(format!("event {id}: title must not be empty"));
            }
            if self.title.chars().count() > MAX_TITLE_LENGTH {
                errors.push(format!("event {id}: title exceeds {MAX_TITLE_LENGTH} characters"));
            }
            if let Some(description) = &self.description {
                if description.chars().count() > MAX_DESCRIPTION_LENGTH {
                    errors.push(format!(
                        "event {id}: description exceeds {MAX_DESCRIPTION_LENGTH} characters"
                    ));
                }
            }
            if self.required_reactions.len() > MAX_REQUIRED_REACTIONS {
                errors.push(format!(
                    "event {id}: more than {MAX_REQUIRED_REACTIONS} required reactions"
                ));
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).single().expect("valid time")
            + Duration::minutes(minute)
    }

    fn sample() -> Event {
        Event::new(100, 10, 1, "Standup", 60.0, vec!["✅".to_string()], at(0))
    }

    #[test]
    fn due_after_one_interval() {
        let event = sample();
        assert!(!event.is_due_for_reminder(at(59)));
        assert!(event.is_due_for_reminder(at(60)));
        assert!(event.is_due_for_reminder(at(90)));
        assert_eq!(event.next_reminder_at(), Some(at(60)));
    }

    #[test]
    fn paused_event_is_never_due() {
        let mut event = sample();
        event.is_paused = true;
        assert!(!event.is_due_for_reminder(at(600)));
    }

    #[test]
    fn mark_sent_resets_due_state() {
        let mut event = sample();
        assert!(event.is_due_for_reminder(at(90)));
        event.mark_reminder_sent(at(90));
        assert!(!event.is_due_for_reminder(at(90)));
        assert_eq!(event.next_reminder_at(), Some(at(150)));
    }

    #[test]
    fn fractional_interval_is_honoured() {
        let mut event = sample();
        event.interval_minutes = 0.5;
        assert_eq!(event.interval(), Some(Duration::seconds(30)));
    }

    /// Tests that intervals outside the representable range are never due
    #[test]
    fn unrepresentable_interval_is_never_due() {
        for minutes in [-1e300, 1e300, f64::NAN, f64::NEG_INFINITY, -5.0, 0.0] {
            let mut event = sample();
            event.interval_minutes = minutes;
            assert_eq!(event.interval(), None, "{minutes}");
            assert_eq!(event.next_reminder_at(), None, "{minutes}");
            assert!(!event.is_due_for_reminder(at(600)), "{minutes}");
        }
    }

    #[test]
    fn next_reminder_beyond_calendar_range_is_none() {
        let mut event = sample();
        event.interval_minutes = 1e12;
        assert!(event.interval().is_some());
        assert_eq!(event.next_reminder_at(), None);
        assert!(!event.is_due_for_reminder(at(600)));
    }

    #[test]
    fn set_reactions_keeps_last_per_user() {
        let mut event = sample();
        event.set_reactions(vec![
            ReactionRecord { user_id: 5, emoji: "✅".into(), reacted_at: at(1) },
            ReactionRecord { user_id: 6, emoji: "✅".into(), reacted_at: at(2) },
            ReactionRecord { user_id: 5, emoji: "❌".into(), reacted_at: at(3) },
        ]);

        assert_eq!(event.reactions.len(), 2);
        assert_eq!(event.reactions[0].emoji, "❌");
        assert_eq!(event.users_who_reacted, vec![5, 6]);
    }

    #[test]
    fn missing_users_excludes_reacted() {
        let mut event = sample();
        event.all_users = vec![5, 6, 7];
        event.set_reactions(vec![ReactionRecord { user_id: 6, emoji: "✅".into(), reacted_at: at(1) }]);
        assert_eq!(event.missing_users(), vec![5, 7]);
    }

    #[test]
    fn hard_invariants_always_checked() {
        let mut event = sample();
        event.interval_minutes = 0.0;
        event.required_reactions.clear();
        event.guild_id = 0;

        let errors = event.validation_errors(false);
        assert_eq!(errors.len(), 3, "{errors:?}");
    }

    #[test]
    fn strict_mode_rejects_blank_title() {
        let mut event = sample();
        event.title = "   ".to_string();

        assert!(event.validation_errors(false).is_empty());
        assert_eq!(event.validation_errors(true).len(), 1);
    }

    #[test]
    fn deserializes_string_snowflakes() {
        let json = serde_json::json!({
            "message_id": "100",
            "channel_id": 10,
            "guild_id": "1",
            "title": "Standup",
            "interval_minutes": 60.0,
            "last_reminder": "2024-01-01T12:00:00Z",
            "created_at": "2024-01-01T12:00:00Z",
            "required_reactions": ["✅"],
            "all_users": ["5", 6]
        });

        let event: Event = serde_json::from_value(json).expect("deserialize");
        assert_eq!(event.message_id, 100);
        assert_eq!(event.guild_id, 1);
        assert_eq!(event.all_users, vec![5, 6]);
        assert!(!event.is_paused);
    }
}
