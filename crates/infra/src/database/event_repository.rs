//! SQLite-backed event repository.
//!
//! Maps [`StorageDocument`] onto the relational schema (`guild`, `user`,
//! `event`, `reaction`, `reminderlog`). Writes are grouped per guild and run
//! through [`TransactionRunner::with_transaction`]; reads acquire a pooled
//! connection on a blocking thread.
//!
//! Ids are stored as signed integers and timestamps as epoch milliseconds.
//! `required_reactions`, `all_users` and `users_who_reacted` are JSON text.

use std::collections::{BTreeMap, BTreeSet};
use std::convert::TryFrom;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reminder_common::storage::{StorageError, StorageResult};
use reminder_common::CommonError;
use reminder_domain::{Event, Guild, ReactionRecord, Result, StorageDocument, User};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tokio::task;
use tracing::{debug, info, instrument};

use super::manager::{map_storage_error, DbManager};
use super::transaction::TransactionRunner;
use crate::errors::map_join_error;

const EVENT_COLUMNS: &str = "message_id, channel_id, guild_id, title, description, \
     interval_minutes, is_paused, last_reminder, required_reactions, created_at, \
     all_users, users_who_reacted";

/// Row counts per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub guilds: usize,
    pub users: usize,
    pub events: usize,
    pub reactions: usize,
    pub reminder_logs: usize,
}

/// Event repository over the shared pool
#[derive(Clone)]
pub struct SqliteEventRepository {
    db: Arc<DbManager>,
    tx: TransactionRunner,
}

impl SqliteEventRepository {
    pub fn new(db: Arc<DbManager>, tx: TransactionRunner) -> Self {
        Self { db, tx }
    }

    pub fn db(&self) -> &Arc<DbManager> {
        &self.db
    }

    pub fn runner(&self) -> &TransactionRunner {
        &self.tx
    }

    /// Make the stored rows match `doc`
    ///
    /// One transaction per guild. Events of a guild that are absent from
    /// `doc` are deleted, so a save of the full document is authoritative.
    /// An event that moved to another guild is updated in place by that
    /// guild's pass and keeps its reminder log.
    #[instrument(skip(self, doc), fields(events = doc.len()))]
    pub async fn save_document(&self, doc: &StorageDocument) -> Result<()> {
        let mut by_guild: BTreeMap<u64, Vec<Event>> = BTreeMap::new();
        for event in doc.events.values() {
            by_guild.entry(event.guild_id).or_default().push(event.clone());
        }

        let stored = self.read(stored_guild_ids).await?;
        let guilds: BTreeSet<u64> = by_guild.keys().copied().chain(stored).collect();
        let live: Arc<BTreeSet<u64>> = Arc::new(doc.events.keys().copied().collect());
        let now = Utc::now();

        for guild_id in guilds {
            let events = by_guild.remove(&guild_id).unwrap_or_default();
            let count = events.len();
            let live = Arc::clone(&live);
            self.tx
                .with_transaction(guild_id, move |tx| sync_guild(tx, guild_id, &events, &live, now))
                .await
                .map_err(map_storage_error)?;
            debug!(guild_id, events = count, "Guild synchronised");
        }
        Ok(())
    }

    /// Every stored event with its reactions
    pub async fn load_document(&self) -> Result<StorageDocument> {
        let events = self.read(|conn| load_events(conn, None)).await?;
        Ok(StorageDocument::from_events(events))
    }

    pub async fn fetch_event(&self, message_id: u64) -> Result<Option<Event>> {
        self.read(move |conn| load_event(conn, message_id)).await
    }

    pub async fn fetch_events(&self, guild_id: Option<u64>) -> Result<Vec<Event>> {
        self.read(move |conn| load_events(conn, guild_id)).await
    }

    pub async fn fetch_due_events(&self, now: DateTime<Utc>) -> Result<Vec<Event>> {
        self.read(move |conn| due_events(conn, now)).await
    }

    /// Append a `reminderlog` row for a sent reminder
    pub async fn record_reminder(
        &self,
        message_id: u64,
        sent_at: DateTime<Utc>,
        users_notified: usize,
    ) -> Result<()> {
        let Some(guild_id) = self.read(move |conn| event_guild(conn, message_id)).await? else {
            return Err(reminder_domain::ReminderError::not_found(format!("event {message_id}")));
        };
        self.tx
            .with_transaction(guild_id, move |tx| {
                insert_reminder_log(tx, message_id, sent_at, users_notified)
            })
            .await
            .map_err(map_storage_error)
    }

    /// Delete an event; its reactions and log rows cascade
    pub async fn delete_event(&self, message_id: u64) -> Result<bool> {
        let Some(guild_id) = self.read(move |conn| event_guild(conn, message_id)).await? else {
            return Ok(false);
        };
        self.tx
            .with_transaction(guild_id, move |tx| {
                let id = sql_id(message_id)?;
                Ok(tx.execute("DELETE FROM event WHERE message_id = ?1", params![id])? > 0)
            })
            .await
            .map_err(map_storage_error)
    }

    /// Delete a guild; its users and events cascade
    pub async fn delete_guild(&self, guild_id: u64) -> Result<bool> {
        self.tx
            .with_transaction(guild_id, move |tx| {
                let id = sql_id(guild_id)?;
                Ok(tx.execute("DELETE FROM guild WHERE guild_id = ?1", params![id])? > 0)
            })
            .await
            .map_err(map_storage_error)
    }

    /// Delete a guild member and their reactions in that guild; returns the
    /// number of reactions removed. Events are never touched.
    pub async fn delete_user(&self, user_id: u64, guild_id: u64) -> Result<usize> {
        self.tx
            .with_transaction(guild_id, move |tx| delete_user(tx, user_id, guild_id))
            .await
            .map_err(map_storage_error)
    }

    pub async fn upsert_guild(&self, guild: Guild) -> Result<()> {
        let guild_id = guild.guild_id;
        self.tx
            .with_transaction(guild_id, move |tx| upsert_guild(tx, &guild))
            .await
            .map_err(map_storage_error)
    }

    pub async fn upsert_user(&self, user: User) -> Result<()> {
        let guild_id = user.guild_id;
        self.tx
            .with_transaction(guild_id, move |tx| {
                ensure_guild(tx, user.guild_id, Utc::now())?;
                upsert_user(tx, &user)
            })
            .await
            .map_err(map_storage_error)
    }

    pub async fn counts(&self) -> Result<TableCounts> {
        self.read(table_counts).await
    }

    /// Empty every relational table in one transaction; returns what was
    /// removed
    pub async fn clear_all(&self) -> Result<TableCounts> {
        let removed = self.tx.run(|tx| clear_tables(tx)).await.map_err(map_storage_error)?;
        info!(?removed, "Relational tables cleared");
        Ok(removed)
    }

    async fn read<T, F>(&self, query: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || -> Result<T> {
            let conn = db.get_connection()?;
            query(&conn).map_err(map_storage_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

/* -------------------------------------------------------------------------- */
/* Row helpers (synchronous, usable inside any transaction) */
/* -------------------------------------------------------------------------- */

/// Snowflake to SQLite INTEGER
pub fn sql_id(id: u64) -> StorageResult<i64> {
    i64::try_from(id).map_err(|_| {
        StorageError::Common(CommonError::validation(
            "id",
            format!("{id} exceeds the SQLite integer range"),
        ))
    })
}

fn row_id(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value))
}

fn row_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

fn row_json<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
    })
}

fn map_event_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        message_id: row_id(row, 0)?,
        channel_id: row_id(row, 1)?,
        guild_id: row_id(row, 2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        interval_minutes: row.get(5)?,
        is_paused: row.get(6)?,
        last_reminder: row_time(row, 7)?,
        required_reactions: row_json(row, 8)?,
        created_at: row_time(row, 9)?,
        reactions: Vec::new(),
        all_users: row_json(row, 10)?,
        users_who_reacted: row_json(row, 11)?,
    })
}

/// Insert a placeholder guild row unless one exists
pub fn ensure_guild(conn: &Connection, guild_id: u64, now: DateTime<Utc>) -> StorageResult<()> {
    let placeholder = Guild::placeholder(guild_id, now);
    conn.execute(
        "INSERT OR IGNORE INTO guild (guild_id, name, settings, created_at, updated_at)
         VALUES (?1, ?2, '{}', ?3, ?3)",
        params![sql_id(guild_id)?, placeholder.name, now.timestamp_millis()],
    )?;
    Ok(())
}

pub fn upsert_guild(conn: &Connection, guild: &Guild) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO guild (guild_id, name, settings, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(guild_id) DO UPDATE SET
             name = excluded.name,
             settings = excluded.settings,
             updated_at = excluded.updated_at",
        params![
            sql_id(guild.guild_id)?,
            guild.name,
            serde_json::to_string(&guild.settings)?,
            guild.created_at.timestamp_millis(),
            guild.updated_at.timestamp_millis(),
        ],
    )?;
    Ok(())
}

/// Insert or update a member; a known username is never cleared
pub fn upsert_user(conn: &Connection, user: &User) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO \"user\" (user_id, guild_id, username, is_bot) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id, guild_id) DO UPDATE SET
             username = COALESCE(excluded.username, \"user\".username),
             is_bot = excluded.is_bot",
        params![sql_id(user.user_id)?, sql_id(user.guild_id)?, user.username, user.is_bot],
    )?;
    Ok(())
}

/// Insert or update an event row; `created_at` of an existing row is kept
pub fn upsert_event(conn: &Connection, event: &Event, now: DateTime<Utc>) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO event (message_id, channel_id, guild_id, title, description,
             interval_minutes, is_paused, last_reminder, required_reactions,
             created_at, updated_at, all_users, users_who_reacted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT(message_id) DO UPDATE SET
             channel_id = excluded.channel_id,
             guild_id = excluded.guild_id,
             title = excluded.title,
             description = excluded.description,
             interval_minutes = excluded.interval_minutes,
             is_paused = excluded.is_paused,
             last_reminder = excluded.last_reminder,
             required_reactions = excluded.required_reactions,
             updated_at = excluded.updated_at,
             all_users = excluded.all_users,
             users_who_reacted = excluded.users_who_reacted",
        params![
            sql_id(event.message_id)?,
            sql_id(event.channel_id)?,
            sql_id(event.guild_id)?,
            event.title,
            event.description,
            event.interval_minutes,
            event.is_paused,
            event.last_reminder.timestamp_millis(),
            serde_json::to_string(&event.required_reactions)?,
            event.created_at.timestamp_millis(),
            now.timestamp_millis(),
            serde_json::to_string(&event.all_users)?,
            serde_json::to_string(&event.users_who_reacted)?,
        ],
    )?;
    Ok(())
}

/// Replace the reaction rows of `event` with its current reaction set
pub fn replace_reactions(conn: &Connection, event: &Event) -> StorageResult<()> {
    let event_id = sql_id(event.message_id)?;
    conn.execute("DELETE FROM reaction WHERE event_id = ?1", params![event_id])?;

    let mut insert = conn.prepare_cached(
        "INSERT INTO reaction (event_id, user_id, emoji, reacted_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(event_id, user_id) DO UPDATE SET
             emoji = excluded.emoji,
             reacted_at = excluded.reacted_at",
    )?;
    for reaction in &event.reactions {
        insert.execute(params![
            event_id,
            sql_id(reaction.user_id)?,
            reaction.emoji,
            reaction.reacted_at.timestamp_millis(),
        ])?;
    }
    Ok(())
}

/// Write one event with its guild, referenced members and reactions
pub fn store_event(conn: &Connection, event: &Event, now: DateTime<Utc>) -> StorageResult<()> {
    ensure_guild(conn, event.guild_id, now)?;
    for user_id in event.referenced_user_ids() {
        conn.execute(
            "INSERT OR IGNORE INTO \"user\" (user_id, guild_id, is_bot) VALUES (?1, ?2, 0)",
            params![sql_id(user_id)?, sql_id(event.guild_id)?],
        )?;
    }
    upsert_event(conn, event, now)?;
    replace_reactions(conn, event)
}

/// Upsert `events` and drop this guild's rows that `live` no longer holds
fn sync_guild(
    conn: &Connection,
    guild_id: u64,
    events: &[Event],
    live: &BTreeSet<u64>,
    now: DateTime<Utc>,
) -> StorageResult<()> {
    for event in events {
        store_event(conn, event, now)?;
    }

    let stored: Vec<i64> = {
        let mut stmt = conn.prepare_cached("SELECT message_id FROM event WHERE guild_id = ?1")?;
        let rows = stmt.query_map(params![sql_id(guild_id)?], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };
    for id in stored {
        if u64::try_from(id).map_or(true, |id| !live.contains(&id)) {
            conn.execute("DELETE FROM event WHERE message_id = ?1", params![id])?;
        }
    }
    Ok(())
}

fn stored_guild_ids(conn: &Connection) -> StorageResult<Vec<u64>> {
    let mut stmt = conn.prepare("SELECT DISTINCT guild_id FROM event")?;
    let rows = stmt.query_map([], |row| row_id(row, 0))?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

fn event_guild(conn: &Connection, message_id: u64) -> StorageResult<Option<u64>> {
    Ok(conn
        .query_row(
            "SELECT guild_id FROM event WHERE message_id = ?1",
            params![sql_id(message_id)?],
            |row| row_id(row, 0),
        )
        .optional()?)
}

fn attach_reactions(conn: &Connection, events: &mut [Event]) -> StorageResult<()> {
    let mut stmt = conn.prepare_cached(
        "SELECT user_id, emoji, reacted_at FROM reaction WHERE event_id = ?1 ORDER BY id",
    )?;
    for event in events.iter_mut() {
        let rows = stmt.query_map(params![sql_id(event.message_id)?], |row| {
            Ok(ReactionRecord {
                user_id: row_id(row, 0)?,
                emoji: row.get(1)?,
                reacted_at: row_time(row, 2)?,
            })
        })?;
        event.reactions = rows.collect::<rusqlite::Result<_>>()?;
    }
    Ok(())
}

/// Events ordered by id, optionally for one guild
pub fn load_events(conn: &Connection, guild_id: Option<u64>) -> StorageResult<Vec<Event>> {
    let mut events: Vec<Event> = match guild_id {
        Some(guild_id) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM event WHERE guild_id = ?1 ORDER BY message_id"
            ))?;
            let rows = stmt.query_map(params![sql_id(guild_id)?], map_event_row)?;
            rows.collect::<rusqlite::Result<_>>()?
        }
        None => {
            let mut stmt =
                conn.prepare(&format!("SELECT {EVENT_COLUMNS} FROM event ORDER BY message_id"))?;
            let rows = stmt.query_map([], map_event_row)?;
            rows.collect::<rusqlite::Result<_>>()?
        }
    };
    attach_reactions(conn, &mut events)?;
    Ok(events)
}

pub fn load_event(conn: &Connection, message_id: u64) -> StorageResult<Option<Event>> {
    let event = conn
        .query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM event WHERE message_id = ?1"),
            params![sql_id(message_id)?],
            map_event_row,
        )
        .optional()?;
    match event {
        Some(event) => {
            let mut events = [event];
            attach_reactions(conn, &mut events)?;
            let [event] = events;
            Ok(Some(event))
        }
        None => Ok(None),
    }
}

/// Unpaused events whose interval has elapsed at `now`
///
/// The SQL filter narrows by the millisecond interval; the final decision is
/// [`Event::is_due_for_reminder`].
pub fn due_events(conn: &Connection, now: DateTime<Utc>) -> StorageResult<Vec<Event>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EVENT_COLUMNS} FROM event
         WHERE is_paused = 0
           AND last_reminder + CAST(ROUND(interval_minutes * 60000) AS INTEGER) <= ?1
         ORDER BY message_id"
    ))?;
    let rows = stmt.query_map(params![now.timestamp_millis()], map_event_row)?;
    let mut events: Vec<Event> = rows
        .collect::<rusqlite::Result<Vec<_>>>()?
        .into_iter()
        .filter(|e| e.is_due_for_reminder(now))
        .collect();
    attach_reactions(conn, &mut events)?;
    Ok(events)
}

pub fn insert_reminder_log(
    conn: &Connection,
    message_id: u64,
    sent_at: DateTime<Utc>,
    users_notified: usize,
) -> StorageResult<()> {
    let notified = i64::try_from(users_notified).unwrap_or(i64::MAX);
    conn.execute(
        "INSERT INTO reminderlog (event_id, sent_at, users_notified, success)
         VALUES (?1, ?2, ?3, 1)",
        params![sql_id(message_id)?, sent_at.timestamp_millis(), notified],
    )?;
    Ok(())
}

fn delete_user(conn: &Connection, user_id: u64, guild_id: u64) -> StorageResult<usize> {
    let (user, guild) = (sql_id(user_id)?, sql_id(guild_id)?);
    let reactions = conn.execute(
        "DELETE FROM reaction
         WHERE user_id = ?1 AND event_id IN (SELECT message_id FROM event WHERE guild_id = ?2)",
        params![user, guild],
    )?;
    conn.execute(
        "DELETE FROM \"user\" WHERE user_id = ?1 AND guild_id = ?2",
        params![user, guild],
    )?;
    Ok(reactions)
}

fn count(conn: &Connection, table: &str) -> StorageResult<usize> {
    let rows: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
    Ok(usize::try_from(rows).unwrap_or_default())
}

pub fn table_counts(conn: &Connection) -> StorageResult<TableCounts> {
    Ok(TableCounts {
        guilds: count(conn, "guild")?,
        users: count(conn, "\"user\"")?,
        events: count(conn, "event")?,
        reactions: count(conn, "reaction")?,
        reminder_logs: count(conn, "reminderlog")?,
    })
}

/// Delete every row, children first
pub fn clear_tables(conn: &Connection) -> StorageResult<TableCounts> {
    Ok(TableCounts {
        reactions: conn.execute("DELETE FROM reaction", [])?,
        reminder_logs: conn.execute("DELETE FROM reminderlog", [])?,
        events: conn.execute("DELETE FROM event", [])?,
        users: conn.execute("DELETE FROM \"user\"", [])?,
        guilds: conn.execute("DELETE FROM guild", [])?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use reminder_common::ConcurrencyStats;
    use tempfile::TempDir;

    use super::*;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).single().expect("valid time")
            + Duration::minutes(minute)
    }

    fn repository(dir: &TempDir) -> SqliteEventRepository {
        let db = Arc::new(DbManager::new(dir.path().join("events.db"), 2).expect("db"));
        db.run_migrations().expect("migrate");
        let runner = TransactionRunner::new(Arc::clone(&db), Arc::new(ConcurrencyStats::new()));
        SqliteEventRepository::new(db, runner)
    }

    fn event(message_id: u64, guild_id: u64) -> Event {
        let mut event =
            Event::new(message_id, 10, guild_id, "Standup", 60.0, vec!["✅".into()], at(0));
        event.description = Some("daily".into());
        event.all_users = vec![5, 6, 7];
        event.set_reactions(vec![ReactionRecord { user_id: 6, emoji: "✅".into(), reacted_at: at(1) }]);
        event
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn document_round_trips() {
        let dir = TempDir::new().expect("temp dir");
        let repo = repository(&dir);
        let doc = StorageDocument::from_events([event(100, 1), event(200, 2)]);

        repo.save_document(&doc).await.expect("save");
        let loaded = repo.load_document().await.expect("load");

        assert_eq!(loaded.events, doc.events);
        let counts = repo.counts().await.expect("counts");
        assert_eq!(counts.guilds, 2);
        assert_eq!(counts.events, 2);
        assert_eq!(counts.reactions, 2);
        assert_eq!(counts.users, 6);
    }

    /// Tests that saving a smaller document removes events that disappeared
    #[tokio::test(flavor = "multi_thread")]
    async fn save_is_authoritative() {
        let dir = TempDir::new().expect("temp dir");
        let repo = repository(&dir);
        repo.save_document(&StorageDocument::from_events([event(100, 1), event(200, 2)]))
            .await
            .expect("first save");

        repo.save_document(&StorageDocument::from_events([event(100, 1)]))
            .await
            .expect("second save");

        assert!(repo.fetch_event(200).await.expect("fetch").is_none());
        assert_eq!(repo.counts().await.expect("counts").reactions, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn due_events_follow_interval() {
        let dir = TempDir::new().expect("temp dir");
        let repo = repository(&dir);
        let mut paused = event(300, 1);
        paused.is_paused = true;
        repo.save_document(&StorageDocument::from_events([event(100, 1), paused]))
            .await
            .expect("save");

        assert!(repo.fetch_due_events(at(59)).await.expect("due").is_empty());
        let due = repo.fetch_due_events(at(90)).await.expect("due");
        assert_eq!(due.iter().map(|e| e.message_id).collect::<Vec<_>>(), vec![100]);
        assert_eq!(due[0].reactions.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn guild_filter_limits_results() {
        let dir = TempDir::new().expect("temp dir");
        let repo = repository(&dir);
        repo.save_document(&StorageDocument::from_events([event(100, 1), event(200, 2)]))
            .await
            .expect("save");

        let events = repo.fetch_events(Some(2)).await.expect("fetch");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message_id, 200);
        assert_eq!(repo.fetch_events(None).await.expect("fetch").len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reminder_log_requires_event() {
        let dir = TempDir::new().expect("temp dir");
        let repo = repository(&dir);
        repo.save_document(&StorageDocument::from_events([event(100, 1)])).await.expect("save");

        repo.record_reminder(100, at(90), 2).await.expect("log");
        assert_eq!(repo.counts().await.expect("counts").reminder_logs, 1);

        let err = repo.record_reminder(999, at(90), 2).await.expect_err("unknown event");
        assert!(matches!(err, reminder_domain::ReminderError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upsert_user_keeps_known_username() {
        let dir = TempDir::new().expect("temp dir");
        let repo = repository(&dir);
        let mut named = User::new(5, 1);
        named.username = Some("ana".into());

        repo.upsert_user(named).await.expect("named");
        repo.upsert_user(User::new(5, 1)).await.expect("anonymous");

        let username: Option<String> = repo
            .db()
            .get_connection()
            .expect("conn")
            .query_row("SELECT username FROM \"user\" WHERE user_id = 5", [], |row| row.get(0))
            .expect("row");
        assert_eq!(username.as_deref(), Some("ana"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clear_all_reports_removed_rows() {
        let dir = TempDir::new().expect("temp dir");
        let repo = repository(&dir);
        repo.save_document(&StorageDocument::from_events([event(100, 1)])).await.expect("save");

        let removed = repo.clear_all().await.expect("clear");

        assert_eq!(removed.events, 1);
        assert_eq!(removed.guilds, 1);
        assert_eq!(repo.counts().await.expect("counts"), TableCounts::default());
    }

    #[test]
    fn oversized_id_is_rejected() {
        assert!(sql_id(u64::MAX).is_err());
        assert_eq!(sql_id(42).expect("fits"), 42);
    }
}
