//! Numbered schema migrations
//!
//! Each migration runs in its own transaction and is recorded in
//! `schemaversion`, so re-running is a no-op.

use chrono::Utc;
use reminder_common::storage::{StorageError, StorageResult};
use rusqlite::{params, Connection};
use tracing::info;

/// One schema step
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "guilds, users, events and reactions",
        sql: include_str!("schema/001_initial.sql"),
    },
    Migration {
        version: 2,
        description: "reminder log",
        sql: include_str!("schema/002_reminder_log.sql"),
    },
    Migration {
        version: 3,
        description: "event audience columns",
        sql: include_str!("schema/003_event_audience.sql"),
    },
];

const SCHEMA_VERSION_TABLE: &str = "CREATE TABLE IF NOT EXISTS schemaversion (
        version     INTEGER PRIMARY KEY,
        applied_at  INTEGER NOT NULL,
        description TEXT    NOT NULL
    )";

pub fn latest_version() -> u32 {
    MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0)
}

/// Highest applied version; 0 for a fresh database
pub fn current_version(conn: &Connection) -> StorageResult<u32> {
    conn.execute_batch(SCHEMA_VERSION_TABLE)?;
    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schemaversion", [], |row| {
            row.get(0)
        })?;
    u32::try_from(version)
        .map_err(|_| StorageError::Migration(format!("invalid schema version {version}")))
}

/// Apply every migration newer than the recorded version; returns the
/// versions applied
pub fn apply_pending(conn: &mut Connection) -> StorageResult<Vec<u32>> {
    let current = current_version(conn)?;
    let latest = latest_version();
    if current > latest {
        return Err(StorageError::SchemaVersionMismatch { expected: latest, found: current });
    }

    let mut applied = Vec::new();
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql).map_err(|err| {
            StorageError::Migration(format!(
                "v{} ({}) failed: {err}",
                migration.version, migration.description
            ))
        })?;
        tx.execute(
            "INSERT INTO schemaversion (version, applied_at, description) VALUES (?1, ?2, ?3)",
            params![migration.version, Utc::now().timestamp_millis(), migration.description],
        )?;
        tx.commit()?;

        info!(version = migration.version, description = migration.description, "Applied schema migration");
        applied.push(migration.version);
    }
    Ok(applied)
}
