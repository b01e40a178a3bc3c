//! Database connection manager backed by the shared SQLite pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reminder_common::storage::{
    PoolHealth, PoolMetrics, SqliteConnection, SqlitePool, SqlitePoolConfig, StorageError,
};
use reminder_domain::{ReminderError, Result};
use rusqlite::params;
use tracing::info;

use super::migrations;
use crate::errors::InfraError;

/// Database manager that wraps an [`SqlitePool`].
pub struct DbManager {
    pool: Arc<SqlitePool>,
    path: PathBuf,
}

impl DbManager {
    /// Open (creating if needed) the database at `db_path`.
    ///
    /// Missing parent directories are created.
    pub fn new<P: AsRef<Path>>(db_path: P, pool_size: u32) -> Result<Self> {
        Self::with_config(db_path, SqlitePoolConfig::with_max_size(pool_size))
    }

    pub fn with_config<P: AsRef<Path>>(db_path: P, config: SqlitePoolConfig) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ReminderError::from(InfraError::from(e)))?;
        }

        let pool = SqlitePool::new(&path, config).map_err(map_storage_error)?;

        info!(
            db_path = %path.display(),
            max_connections = pool.max_size(),
            "sqlite pool initialised"
        );

        Ok(Self { pool: Arc::new(pool), path })
    }

    /// Borrow the underlying pool.
    pub fn pool(&self) -> &Arc<SqlitePool> {
        &self.pool
    }

    /// Acquire a connection from the pool.
    pub fn get_connection(&self) -> Result<SqliteConnection> {
        self.pool.get_sqlite_connection().map_err(map_storage_error)
    }

    /// Apply pending schema migrations; returns the versions applied.
    pub fn run_migrations(&self) -> Result<Vec<u32>> {
        let mut conn = self.get_connection()?;
        migrations::apply_pending(&mut conn).map_err(map_storage_error)
    }

    pub fn schema_version(&self) -> Result<u32> {
        let conn = self.get_connection()?;
        migrations::current_version(&conn).map_err(map_storage_error)
    }

    /// Return the configured database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Connectivity plus an up-to-date schema
    pub fn health_check(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", params![], |row| row.get::<_, i32>(0)).map_err(map_sql_error)?;
        let version = migrations::current_version(&conn).map_err(map_storage_error)?;
        if version < migrations::latest_version() {
            return Err(ReminderError::Database(format!(
                "schema at version {version}, expected {}",
                migrations::latest_version()
            )));
        }
        Ok(())
    }

    pub fn pool_health(&self) -> PoolHealth {
        self.pool.health_check()
    }

    pub fn pool_metrics(&self) -> PoolMetrics {
        self.pool.pool_metrics()
    }
}

pub(crate) fn map_sql_error(err: rusqlite::Error) -> ReminderError {
    ReminderError::from(InfraError::from(err))
}

pub(crate) fn map_storage_error(err: StorageError) -> ReminderError {
    ReminderError::from(InfraError::from(err))
}
