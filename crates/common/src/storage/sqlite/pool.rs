//! SQLite connection pool
//!
//! r2d2 pool over `r2d2_sqlite`; every new connection gets the pragmas from
//! [`SqlitePoolConfig`] before it is handed out.

use std::path::{Path, PathBuf};
use std::time::Instant;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tracing::{debug, info, instrument, warn};

use super::config::SqlitePoolConfig;
use super::connection::SqliteConnection;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::metrics::{PoolHealth, PoolMetrics, PoolStats};

/// Pooled access to one SQLite database file
#[derive(Debug)]
pub struct SqlitePool {
    pool: Pool<SqliteConnectionManager>,
    config: SqlitePoolConfig,
    stats: PoolStats,
    path: PathBuf,
}

impl SqlitePool {
    /// Open the pool and prove the file is a readable database
    ///
    /// The parent directory of `path` must exist. An unreadable or corrupt
    /// file fails here rather than on first use.
    #[instrument(skip(config), fields(db_path = %path.display(), pool_size = config.max_size))]
    pub fn new(path: &Path, config: SqlitePoolConfig) -> StorageResult<Self> {
        let pragmas = config.clone();
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| pragmas.apply(conn));

        let pool = Pool::builder()
            .max_size(config.max_size)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .map_err(|e| {
                warn!(error = %e, "Failed to build SQLite pool");
                StorageError::Connection(format!("Failed to create pool: {e}"))
            })?;

        let probe = pool
            .get()
            .map_err(|e| StorageError::Connection(format!("Failed to get test connection: {e}")))?;
        probe
            .query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map_err(|e| StorageError::Connection(format!("Database unreadable: {e}")))?;
        drop(probe);

        info!("SQLite pool ready");
        Ok(Self { pool, config, stats: PoolStats::new(), path: path.to_path_buf() })
    }

    /// Database file backing this pool
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_size(&self) -> u32 {
        self.config.max_size
    }

    /// Check out a connection
    ///
    /// Blocks up to the configured connection timeout when every connection
    /// is in use.
    pub fn get_sqlite_connection(&self) -> StorageResult<SqliteConnection> {
        let started = Instant::now();
        match self.pool.get() {
            Ok(conn) => {
                let waited = started.elapsed();
                self.stats.record_acquired(waited);
                debug!(wait_us = waited.as_micros() as u64, "Connection acquired");
                Ok(SqliteConnection::new(conn))
            }
            Err(_) if started.elapsed() >= self.config.connection_timeout => {
                self.stats.record_timeout();
                warn!(timeout = ?self.config.connection_timeout, "Timed out waiting for a connection");
                Err(StorageError::Timeout(self.config.connection_timeout))
            }
            Err(e) => {
                self.stats.record_error();
                warn!(error = %e, "Connection checkout failed");
                Err(StorageError::Connection(format!("Failed to get connection: {e}")))
            }
        }
    }

    /// Probe the pool by checking out a connection
    pub fn health_check(&self) -> PoolHealth {
        let state = self.pool.state();
        let error = self.pool.get().err().map(|e| e.to_string());
        PoolHealth {
            healthy: error.is_none(),
            open_connections: state.connections,
            idle_connections: state.idle_connections,
            max_connections: self.config.max_size,
            error,
        }
    }

    pub fn pool_metrics(&self) -> PoolMetrics {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn fast_fail_config() -> SqlitePoolConfig {
        SqlitePoolConfig {
            max_size: 1,
            connection_timeout: std::time::Duration::from_millis(300),
            ..SqlitePoolConfig::default()
        }
    }

    #[test]
    fn test_concurrent_connections() {
        let temp_dir = TempDir::new().expect("temp dir");
        let db_path = temp_dir.path().join("test.db");

        let pool = std::sync::Arc::new(
            SqlitePool::new(&db_path, SqlitePoolConfig::default()).expect("pool"),
        );

        {
            let conn = pool.get_sqlite_connection().expect("connection");
            conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY, value TEXT)", [])
                .expect("create table");
        }

        let mut handles = vec![];
        for i in 0..5 {
            let pool_clone = std::sync::Arc::clone(&pool);
            handles.push(std::thread::spawn(move || {
                let conn = pool_clone.get_sqlite_connection().expect("connection");
                let value = format!("thread_{}", i);
                conn.execute("INSERT INTO test (value) VALUES (?1)", [&value]).expect("insert");
            }));
        }
        for handle in handles {
            handle.join().expect("thread joined");
        }

        let conn = pool.get_sqlite_connection().expect("connection");
        let count: i32 =
            conn.query_row("SELECT COUNT(*) FROM test", [], |row| row.get(0)).expect("count");
        assert_eq!(count, 5);
        assert!(pool.pool_metrics().connections_acquired >= 7);
    }

    #[test]
    fn test_health_check() {
        let temp_dir = TempDir::new().expect("temp dir");
        let pool = SqlitePool::new(&temp_dir.path().join("test.db"), SqlitePoolConfig::default())
            .expect("pool");

        let health = pool.health_check();
        assert!(health.healthy);
        assert_eq!(health.max_connections, 4);
    }

    #[test]
    fn test_missing_parent_directory_fails() {
        let temp_dir = TempDir::new().expect("temp dir");
        let db_path = temp_dir.path().join("missing").join("test.db");

        let result = SqlitePool::new(&db_path, fast_fail_config());
        assert!(matches!(result, Err(StorageError::Connection(_))));
    }

    #[test]
    fn test_garbage_file_is_rejected() {
        let temp_dir = TempDir::new().expect("temp dir");
        let db_path = temp_dir.path().join("garbage.db");
        std::fs::write(&db_path, vec![0x42_u8; 4096]).expect("write garbage");

        let result = SqlitePool::new(&db_path, fast_fail_config());
        assert!(result.is_err());
    }
}
