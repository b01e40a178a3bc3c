//! One-shot JSON → SQLite migration
//!
//! Order of work: back up the flat file, validate every record, build
//! deduplicated guild/user rows, then insert the whole batch in a single
//! transaction. Validation errors stop the run before any transaction is
//! opened.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reminder_common::storage::StorageResult;
use reminder_core::storage::StorageBackend;
use reminder_domain::{Event, Guild, Result, StorageDocument, User};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::validator::validate_document;
use crate::database::event_repository::{replace_reactions, upsert_event, upsert_guild, upsert_user};
use crate::database::manager::map_storage_error;
use crate::storage::{JsonStorageBackend, SqliteStorageBackend};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationOptions {
    /// Move the flat file aside after a successful migration
    pub archive: bool,
    /// Validate and count without writing anything
    pub dry_run: bool,
}

/// Outcome of a migration run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationReport {
    pub success: bool,
    pub dry_run: bool,
    pub records: usize,
    pub events: usize,
    pub guilds: usize,
    pub users: usize,
    pub reactions: usize,
    pub backup: Option<PathBuf>,
    pub archived: Option<PathBuf>,
    pub errors: Vec<String>,
}

/// Rows derived from a validated document, deduplicated across the batch
#[derive(Debug, Clone, Default)]
pub struct MigrationBatch {
    pub guilds: BTreeMap<u64, Guild>,
    pub users: BTreeMap<(u64, u64), User>,
    pub events: Vec<Event>,
}

impl MigrationBatch {
    /// One guild row per guild id and one user row per (user, guild) pair
    ///
    /// Users come from reactions, `all_users` and `users_who_reacted`. A
    /// guild's `created_at` is its oldest event's.
    pub fn from_document(document: &StorageDocument, now: DateTime<Utc>) -> Self {
        let mut batch = Self::default();
        for event in document.events.values() {
            let guild = batch
                .guilds
                .entry(event.guild_id)
                .or_insert_with(|| Guild::placeholder(event.guild_id, now));
            if event.created_at < guild.created_at {
                guild.created_at = event.created_at;
            }
            for user_id in event.referenced_user_ids() {
                batch
                    .users
                    .entry((user_id, event.guild_id))
                    .or_insert_with(|| User::new(user_id, event.guild_id));
            }
            batch.events.push(event.clone());
        }
        batch
    }

    pub fn reaction_count(&self) -> usize {
        self.events.iter().map(|e| e.reactions.len()).sum()
    }

    /// Write every row; the caller owns the transaction
    pub fn insert(&self, conn: &Connection, now: DateTime<Utc>) -> StorageResult<()> {
        for guild in self.guilds.values() {
            upsert_guild(conn, guild)?;
        }
        for user in self.users.values() {
            upsert_user(conn, user)?;
        }
        for event in &self.events {
            upsert_event(conn, event, now)?;
            replace_reactions(conn, event)?;
        }
        Ok(())
    }
}

/// Moves the flat file's contents into SQLite
pub struct JsonToSqliteMigrator {
    json: Arc<JsonStorageBackend>,
    sqlite: Arc<SqliteStorageBackend>,
}

impl JsonToSqliteMigrator {
    pub fn new(json: Arc<JsonStorageBackend>, sqlite: Arc<SqliteStorageBackend>) -> Self {
        Self { json, sqlite }
    }

    /// Run the migration
    ///
    /// Validation problems are returned in the report with `success =
    /// false`; `Err` is reserved for I/O and database failures.
    #[instrument(skip(self))]
    pub async fn migrate(&self, options: MigrationOptions) -> Result<MigrationReport> {
        let mut report = MigrationReport { dry_run: options.dry_run, ..MigrationReport::default() };

        if !options.dry_run {
            report.backup = self.json.backup().await?;
        }

        let Some(raw) = self.json.read_raw().await? else {
            report.errors.push(format!("{} does not exist", self.json.path().display()));
            warn!(path = %self.json.path().display(), "Nothing to migrate");
            return Ok(report);
        };

        let validation = validate_document(&raw);
        report.records = validation.records;
        if !validation.is_valid() {
            warn!(
                records = validation.records,
                invalid = validation.records - validation.valid,
                errors = validation.errors.len(),
                "Migration aborted by validation"
            );
            report.errors = validation.errors;
            return Ok(report);
        }

        let now = Utc::now();
        let document = StorageDocument::from_flat_json(&raw)?;
        let batch = MigrationBatch::from_document(&document, now);
        report.events = batch.events.len();
        report.guilds = batch.guilds.len();
        report.users = batch.users.len();
        report.reactions = batch.reaction_count();

        if options.dry_run {
            report.success = true;
            info!(events = report.events, "Dry run complete");
            return Ok(report);
        }

        self.sqlite.initialize().await?;
        let repository = self.sqlite.repository()?;
        let batch = Arc::new(batch);
        repository
            .runner()
            .run(move |tx| batch.insert(tx, now))
            .await
            .map_err(map_storage_error)?;

        if options.archive {
            report.archived = self.json.archive().await?;
        }

        report.success = true;
        info!(
            events = report.events,
            guilds = report.guilds,
            users = report.users,
            reactions = report.reactions,
            "JSON data migrated to SQLite"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use reminder_common::ConcurrencyStats;
    use reminder_domain::ReactionRecord;
    use tempfile::TempDir;

    use super::*;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).single().expect("valid time")
            + Duration::minutes(minute)
    }

    fn event(message_id: u64, guild_id: u64, users: &[u64]) -> Event {
        let mut event =
            Event::new(message_id, 10, guild_id, "Standup", 60.0, vec!["✅".into()], at(message_id as i64));
        event.all_users = users.to_vec();
        event.set_reactions(
            users
                .iter()
                .take(1)
                .map(|&user_id| ReactionRecord { user_id, emoji: "✅".into(), reacted_at: at(1) })
                .collect(),
        );
        event
    }

    fn backends(dir: &TempDir) -> (Arc<JsonStorageBackend>, Arc<SqliteStorageBackend>) {
        (
            Arc::new(JsonStorageBackend::new(dir.path().join("reminders.json"))),
            Arc::new(SqliteStorageBackend::new(
                dir.path().join("bot.db"),
                2,
                Arc::new(ConcurrencyStats::new()),
            )),
        )
    }

    #[test]
    fn batch_dedups_users_per_guild() {
        let document = StorageDocument::from_events([
            event(1, 1, &[5, 6]),
            event(2, 1, &[5, 7]),
            event(3, 2, &[5]),
        ]);

        let batch = MigrationBatch::from_document(&document, at(100));

        assert_eq!(batch.guilds.len(), 2);
        assert_eq!(batch.users.len(), 4);
        assert!(batch.users.contains_key(&(5, 1)));
        assert!(batch.users.contains_key(&(5, 2)));
        assert_eq!(batch.guilds[&1].created_at, at(1));
        assert_eq!(batch.reaction_count(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn migrates_valid_file() {
        let dir = TempDir::new().expect("temp dir");
        let (json, sqlite) = backends(&dir);
        let document = StorageDocument::from_events([event(1, 1, &[5, 6]), event(2, 2, &[5])]);
        json.save(&document).await.expect("seed json");

        let report = JsonToSqliteMigrator::new(Arc::clone(&json), Arc::clone(&sqlite))
            .migrate(MigrationOptions { archive: true, dry_run: false })
            .await
            .expect("migrate");

        assert!(report.success, "{:?}", report.errors);
        assert_eq!(report.events, 2);
        assert!(report.backup.as_ref().is_some_and(|p| p.exists()));
        assert!(report.archived.is_some());
        assert!(!json.exists().await);
        assert_eq!(sqlite.load().await.expect("load").events, document.events);
    }

    /// Tests that one bad record keeps every record out of SQLite
    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_record_blocks_everything() {
        let dir = TempDir::new().expect("temp dir");
        let (json, sqlite) = backends(&dir);
        let mut broken = event(2, 1, &[5]);
        broken.interval_minutes = -1.0;
        json.save(&StorageDocument::from_events([event(1, 1, &[5]), broken]))
            .await
            .expect("seed json");

        let report = JsonToSqliteMigrator::new(Arc::clone(&json), Arc::clone(&sqlite))
            .migrate(MigrationOptions::default())
            .await
            .expect("migrate");

        assert!(!report.success);
        assert_eq!(report.records, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(!sqlite.is_initialized());
        assert!(json.exists().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dry_run_writes_nothing() {
        let dir = TempDir::new().expect("temp dir");
        let (json, sqlite) = backends(&dir);
        json.save(&StorageDocument::from_events([event(1, 1, &[5])])).await.expect("seed json");

        let report = JsonToSqliteMigrator::new(Arc::clone(&json), Arc::clone(&sqlite))
            .migrate(MigrationOptions { archive: true, dry_run: true })
            .await
            .expect("dry run");

        assert!(report.success);
        assert_eq!(report.events, 1);
        assert!(report.backup.is_none());
        assert!(!sqlite.path().exists());
        assert!(json.list_backups().await.expect("list").is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_file_is_reported() {
        let dir = TempDir::new().expect("temp dir");
        let (json, sqlite) = backends(&dir);

        let report =
            JsonToSqliteMigrator::new(json, sqlite).migrate(MigrationOptions::default()).await.expect("run");

        assert!(!report.success);
        assert_eq!(report.errors.len(), 1);
    }
}
