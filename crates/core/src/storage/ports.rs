//! Storage backend port
//!
//! Implemented in infra by the JSON flat-file backend and the SQLite backend.
//! Both exchange the whole [`StorageDocument`]; the read helpers default to
//! filtering a full `load()` so only backends with a cheaper path override them.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reminder_domain::{Event, Result, StorageDocument};
use serde::Serialize;

/// Which concrete backend sits behind a [`StorageBackend`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Json,
    Sqlite,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Sqlite => "sqlite",
        })
    }
}

/// Persistence capability shared by every backend
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Prepare the backend (open files, pools, run migrations)
    async fn initialize(&self) -> Result<()>;

    /// Replace the persisted document
    async fn save(&self, document: &StorageDocument) -> Result<()>;

    async fn load(&self) -> Result<StorageDocument>;

    /// Copy current data aside; `None` when there was nothing to back up
    async fn backup(&self) -> Result<Option<PathBuf>>;

    /// Reports, never repairs
    async fn validate_integrity(&self) -> Result<bool>;

    /// Release resources; safe to call more than once
    async fn cleanup(&self) -> Result<()>;

    async fn fetch_event(&self, message_id: u64) -> Result<Option<Event>> {
        Ok(self.load().await?.remove(message_id))
    }

    async fn fetch_events(&self, guild_id: Option<u64>) -> Result<Vec<Event>> {
        let document = self.load().await?;
        Ok(document
            .events
            .into_values()
            .filter(|e| guild_id.map_or(true, |g| e.guild_id == g))
            .collect())
    }

    async fn fetch_due_events(&self, now: DateTime<Utc>) -> Result<Vec<Event>> {
        let document = self.load().await?;
        Ok(document.events.into_values().filter(|e| e.is_due_for_reminder(now)).collect())
    }

    /// Append to the reminder log, where the backend keeps one
    async fn record_reminder(
        &self,
        _message_id: u64,
        _sent_at: DateTime<Utc>,
        _users_notified: usize,
    ) -> Result<()> {
        Ok(())
    }
}
