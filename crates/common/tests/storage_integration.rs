//! Integration tests for the storage module
//!
//! These tests verify end-to-end pool behaviour:
//! - Pragmas applied to every pooled connection
//! - Foreign-key cascades through pooled connections
//! - Health checks and metrics
//! - Error classification of SQLite busy failures

#![cfg(feature = "platform")]

use std::path::PathBuf;
use std::time::Duration;

use reminder_common::error::ErrorClassification;
use reminder_common::storage::{SqlitePool, SqlitePoolConfig, StorageError};
use tempfile::TempDir;

fn temp_db_path() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("temp dir");
    let db_path = temp_dir.path().join("test.db");
    (temp_dir, db_path)
}

#[test]
fn every_pooled_connection_enforces_foreign_keys() {
    let (_dir, db_path) = temp_db_path();
    let pool = SqlitePool::new(&db_path, SqlitePoolConfig::with_max_size(3)).expect("pool");

    let conns: Vec<_> =
        (0..3).map(|_| pool.get_sqlite_connection().expect("connection")).collect();
    for conn in &conns {
        let fk: i32 =
            conn.pragma_query_value(None, "foreign_keys", |row| row.get(0)).expect("pragma");
        assert_eq!(fk, 1);
    }
}

#[test]
fn cascade_delete_through_pool() {
    let (_dir, db_path) = temp_db_path();
    let pool = SqlitePool::new(&db_path, SqlitePoolConfig::default()).expect("pool");
    let conn = pool.get_sqlite_connection().expect("connection");

    conn.execute_batch(
        "CREATE TABLE parent (id INTEGER PRIMARY KEY);
         CREATE TABLE child (
             id INTEGER PRIMARY KEY,
             parent_id INTEGER NOT NULL REFERENCES parent(id) ON DELETE CASCADE
         );
         INSERT INTO parent (id) VALUES (1);
         INSERT INTO child (parent_id) VALUES (1), (1);",
    )
    .expect("schema");

    conn.execute("DELETE FROM parent WHERE id = 1", []).expect("delete parent");

    let children: i64 =
        conn.query_row("SELECT COUNT(*) FROM child", [], |row| row.get(0)).expect("count");
    assert_eq!(children, 0);
}

#[test]
fn pool_exhaustion_times_out_as_retryable() {
    let (_dir, db_path) = temp_db_path();
    let config = SqlitePoolConfig {
        max_size: 1,
        connection_timeout: Duration::from_millis(200),
        ..SqlitePoolConfig::default()
    };
    let pool = SqlitePool::new(&db_path, config).expect("pool");

    let _held = pool.get_sqlite_connection().expect("first connection");
    let err = pool.get_sqlite_connection().expect_err("pool exhausted");

    assert!(matches!(err, StorageError::Timeout(_)), "unexpected error: {err:?}");
    assert!(err.is_retryable());
    assert_eq!(pool.pool_metrics().connection_timeouts, 1);
}

#[test]
fn health_and_metrics_report_pool_state() {
    let (_dir, db_path) = temp_db_path();
    let pool = SqlitePool::new(&db_path, SqlitePoolConfig::with_max_size(2)).expect("pool");

    {
        let _conn = pool.get_sqlite_connection().expect("connection");
    }

    let health = pool.health_check();
    assert!(health.healthy);
    assert_eq!(health.max_connections, 2);
    assert_eq!(pool.pool_metrics().connections_acquired, 1);
    assert_eq!(pool.path(), db_path.as_path());
}
