//! SQLite backend
//!
//! The pool is opened lazily by `initialize`, which also applies pending
//! schema migrations. `cleanup` drops the pool; a later `initialize` reopens
//! it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reminder_common::resilience::RetryConfig;
use reminder_common::ConcurrencyStats;
use reminder_core::storage::{BackendKind, StorageBackend};
use reminder_domain::{Event, ReminderError, Result, StorageConfig, StorageDocument};
use rusqlite::params;
use tokio::task;
use tracing::{info, instrument, warn};

use super::backup::{self, BackupFile};
use crate::database::manager::map_sql_error;
use crate::database::{DbManager, SqliteEventRepository, TransactionRunner};
use crate::errors::{map_join_error, InfraError};

/// SQLite-backed [`StorageBackend`]
pub struct SqliteStorageBackend {
    path: PathBuf,
    pool_size: u32,
    backup_dir: Option<PathBuf>,
    stats: Arc<ConcurrencyStats>,
    retry: RetryConfig,
    repository: RwLock<Option<SqliteEventRepository>>,
}

impl SqliteStorageBackend {
    pub fn new(path: impl Into<PathBuf>, pool_size: u32, stats: Arc<ConcurrencyStats>) -> Self {
        Self {
            path: path.into(),
            pool_size,
            backup_dir: None,
            stats,
            retry: RetryConfig::default(),
            repository: RwLock::new(None),
        }
    }

    pub fn from_config(config: &StorageConfig, stats: Arc<ConcurrencyStats>) -> Self {
        Self::new(&config.sqlite_path, config.pool_size, stats)
            .with_backup_dir(config.backup_dir.clone())
    }

    pub fn with_backup_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.backup_dir = dir;
        self
    }

    /// Retry policy for busy/locked transactions
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> &Arc<ConcurrencyStats> {
        &self.stats
    }

    pub fn is_initialized(&self) -> bool {
        self.repository.read().is_some()
    }

    /// Repository of the open pool
    pub fn repository(&self) -> Result<SqliteEventRepository> {
        self.repository
            .read()
            .clone()
            .ok_or_else(|| ReminderError::NotReady("sqlite backend is not initialized".into()))
    }

    pub fn backup_dir(&self) -> PathBuf {
        backup::backup_dir(&self.path, self.backup_dir.as_deref())
    }

    pub async fn list_backups(&self) -> Result<Vec<BackupFile>> {
        Ok(backup::list_backups(&self.path, &self.backup_dir()).await.map_err(InfraError::from)?)
    }

    /// Problems reported by `integrity_check` and `foreign_key_check`;
    /// empty when the database is sound
    pub async fn integrity_problems(&self) -> Result<Vec<String>> {
        let db = Arc::clone(self.repository()?.db());
        task::spawn_blocking(move || -> Result<Vec<String>> {
            let conn = db.get_connection()?;

            let mut stmt = conn.prepare("PRAGMA integrity_check").map_err(map_sql_error)?;
            let mut problems: Vec<String> = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql_error)?
                .into_iter()
                .filter(|line| line != "ok")
                .collect();

            let mut stmt = conn.prepare("PRAGMA foreign_key_check").map_err(map_sql_error)?;
            let orphans = stmt
                .query_map([], |row| {
                    Ok(format!(
                        "orphan row {} in {} referencing {}",
                        row.get::<_, Option<i64>>(1)?.unwrap_or_default(),
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql_error)?;
            problems.extend(orphans);
            Ok(problems)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl StorageBackend for SqliteStorageBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn initialize(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }

        let path = self.path.clone();
        let pool_size = self.pool_size;
        let (db, applied) = task::spawn_blocking(move || -> Result<(DbManager, Vec<u32>)> {
            let db = DbManager::new(&path, pool_size)?;
            let applied = db.run_migrations()?;
            db.health_check()?;
            Ok((db, applied))
        })
        .await
        .map_err(map_join_error)??;

        let db = Arc::new(db);
        let runner = TransactionRunner::new(Arc::clone(&db), Arc::clone(&self.stats))
            .with_retry(self.retry.clone());
        *self.repository.write() = Some(SqliteEventRepository::new(db, runner));

        info!(migrations_applied = applied.len(), "SQLite backend ready");
        Ok(())
    }

    async fn save(&self, document: &StorageDocument) -> Result<()> {
        self.repository()?.save_document(document).await
    }

    async fn load(&self) -> Result<StorageDocument> {
        self.repository()?.load_document().await
    }

    /// `VACUUM INTO` a timestamped sibling file
    async fn backup(&self) -> Result<Option<PathBuf>> {
        let repository = match self.repository() {
            Ok(repository) => repository,
            Err(_) if !self.path.exists() => return Ok(None),
            Err(err) => return Err(err),
        };
        let dir = self.backup_dir();
        let db = Arc::clone(repository.db());
        let target = task::spawn_blocking(move || -> Result<PathBuf> {
            std::fs::create_dir_all(&dir).map_err(InfraError::from)?;
            let target = backup::next_backup_path(db.path(), &dir, Utc::now(), None);
            let conn = db.get_connection()?;
            conn.execute("VACUUM INTO ?1", params![target.to_string_lossy().into_owned()])
                .map_err(map_sql_error)?;
            Ok(target)
        })
        .await
        .map_err(map_join_error)??;

        info!(backup = %target.display(), "SQLite backup written");
        Ok(Some(target))
    }

    async fn validate_integrity(&self) -> Result<bool> {
        let problems = self.integrity_problems().await?;
        if problems.is_empty() {
            Ok(true)
        } else {
            warn!(count = problems.len(), first = %problems[0], "SQLite integrity check failed");
            Ok(false)
        }
    }

    async fn cleanup(&self) -> Result<()> {
        if self.repository.write().take().is_some() {
            info!(path = %self.path.display(), "SQLite pool closed");
        }
        Ok(())
    }

    async fn fetch_event(&self, message_id: u64) -> Result<Option<Event>> {
        self.repository()?.fetch_event(message_id).await
    }

    async fn fetch_events(&self, guild_id: Option<u64>) -> Result<Vec<Event>> {
        self.repository()?.fetch_events(guild_id).await
    }

    async fn fetch_due_events(&self, now: DateTime<Utc>) -> Result<Vec<Event>> {
        self.repository()?.fetch_due_events(now).await
    }

    async fn record_reminder(
        &self,
        message_id: u64,
        sent_at: DateTime<Utc>,
        users_notified: usize,
    ) -> Result<()> {
        self.repository()?.record_reminder(message_id, sent_at, users_notified).await
    }
}
