//! Rollback from SQLite to the flat file
//!
//! A rollback restores a JSON backup as the source of truth and empties the
//! relational tables. The current flat file, if any, is first copied aside
//! with the `rollback` tag; such copies are never offered as candidates, so
//! rollbacks do not chain.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reminder_core::storage::StorageBackend;
use reminder_domain::constants::ROLLBACK_BACKUP_TAG;
use reminder_domain::{ReminderError, Result};
use serde::Serialize;
use tracing::{info, instrument};

use crate::database::TableCounts;
use crate::storage::backup::parse_backup_name;
use crate::storage::{BackupFile, JsonStorageBackend, SqliteStorageBackend};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollbackReport {
    pub restored_from: PathBuf,
    /// Copy of the flat file as it was before the rollback
    pub safety_backup: Option<PathBuf>,
    pub events_restored: usize,
    pub rows_cleared: TableCounts,
}

pub struct RollbackManager {
    json: Arc<JsonStorageBackend>,
    sqlite: Arc<SqliteStorageBackend>,
}

impl RollbackManager {
    pub fn new(json: Arc<JsonStorageBackend>, sqlite: Arc<SqliteStorageBackend>) -> Self {
        Self { json, sqlite }
    }

    /// JSON backups a rollback may restore, newest first
    pub async fn list_candidates(&self) -> Result<Vec<BackupFile>> {
        let mut backups = self.json.list_backups().await?;
        backups.retain(|b| !b.is_tagged(ROLLBACK_BACKUP_TAG));
        Ok(backups)
    }

    /// Restore `backup` as the flat file and clear the relational tables
    #[instrument(skip(self), fields(backup = %backup.display()))]
    pub async fn rollback(&self, backup: &Path) -> Result<RollbackReport> {
        let tagged = backup
            .file_name()
            .and_then(|name| parse_backup_name(self.json.path(), &name.to_string_lossy()))
            .and_then(|(_, tag)| tag);
        if tagged.as_deref() == Some(ROLLBACK_BACKUP_TAG) {
            return Err(ReminderError::InvalidInput(format!(
                "{} was produced by a rollback and cannot be restored",
                backup.display()
            )));
        }
        if !backup.exists() {
            return Err(ReminderError::not_found(format!("backup {}", backup.display())));
        }

        let safety_backup = self.json.backup_tagged(Some(ROLLBACK_BACKUP_TAG)).await?;
        let restored = self.json.restore_from(backup).await?;

        self.sqlite.initialize().await?;
        let rows_cleared = self.sqlite.repository()?.clear_all().await?;

        info!(
            events = restored.len(),
            safety_backup = ?safety_backup,
            "Rolled back to JSON backup"
        );
        Ok(RollbackReport {
            restored_from: backup.to_path_buf(),
            safety_backup,
            events_restored: restored.len(),
            rows_cleared,
        })
    }

    /// Write the SQLite contents to `target` in the flat-file format;
    /// returns the number of events written
    pub async fn export_to_json(&self, target: &Path) -> Result<usize> {
        self.sqlite.initialize().await?;
        let document = self.sqlite.load().await?;
        JsonStorageBackend::new(target).save(&document).await?;
        info!(target = %target.display(), events = document.len(), "SQLite exported to JSON");
        Ok(document.len())
    }
}
