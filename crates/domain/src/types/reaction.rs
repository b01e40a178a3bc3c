//! Reaction types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::snowflake;

/// A reaction as embedded in an [`Event`](super::Event)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionRecord {
    #[serde(with = "snowflake")]
    pub user_id: u64,
    pub emoji: String,
    pub reacted_at: DateTime<Utc>,
}

/// Relational reaction row; unique on (`event_id`, `user_id`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub event_id: u64,
    pub user_id: u64,
    pub emoji: String,
    pub reacted_at: DateTime<Utc>,
}

impl From<&Reaction> for ReactionRecord {
    fn from(row: &Reaction) -> Self {
        Self { user_id: row.user_id, emoji: row.emoji.clone(), reacted_at: row.reacted_at }
    }
}
