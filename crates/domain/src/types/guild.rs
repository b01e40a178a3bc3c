//! Guild and user types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Discord guild; owns its users and events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guild {
    pub guild_id: u64,
    pub name: String,
    /// Free-form settings, stored as JSON text in SQLite
    #[serde(default)]
    pub settings: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Guild {
    /// Placeholder guild for ids first seen through an event
    pub fn placeholder(guild_id: u64, now: DateTime<Utc>) -> Self {
        Self {
            guild_id,
            name: format!("Guild {guild_id}"),
            settings: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A guild member; unique on (`user_id`, `guild_id`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub user_id: u64,
    pub guild_id: u64,
    pub username: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
}

impl User {
    pub fn new(user_id: u64, guild_id: u64) -> Self {
        Self { user_id, guild_id, username: None, is_bot: false }
    }
}
