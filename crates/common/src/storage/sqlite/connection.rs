//! Checked-out connection handle

use std::fmt;
use std::ops::{Deref, DerefMut};

use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

/// A connection borrowed from [`SqlitePool`](super::SqlitePool); goes back
/// to the pool on drop and derefs to [`rusqlite::Connection`]
pub struct SqliteConnection(PooledConnection<SqliteConnectionManager>);

impl SqliteConnection {
    pub(crate) fn new(conn: PooledConnection<SqliteConnectionManager>) -> Self {
        Self(conn)
    }
}

impl Deref for SqliteConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.0
    }
}

impl DerefMut for SqliteConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.0
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SqliteConnection").finish()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::storage::sqlite::{SqlitePool, SqlitePoolConfig};

    #[test]
    fn transaction_commit_is_visible() {
        let temp_dir = TempDir::new().expect("temp dir");
        let pool = SqlitePool::new(&temp_dir.path().join("test.db"), SqlitePoolConfig::default())
            .expect("pool");
        let mut conn = pool.get_sqlite_connection().expect("connection");

        conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT)", [])
            .expect("create table");

        let tx = conn.transaction().expect("begin");
        tx.execute("INSERT INTO test (name) VALUES (?1)", ["standup"]).expect("insert");
        tx.commit().expect("commit");

        let name: String =
            conn.query_row("SELECT name FROM test WHERE id = 1", [], |row| row.get(0)).expect("row");
        assert_eq!(name, "standup");
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let temp_dir = TempDir::new().expect("temp dir");
        let pool = SqlitePool::new(&temp_dir.path().join("test.db"), SqlitePoolConfig::default())
            .expect("pool");
        let mut conn = pool.get_sqlite_connection().expect("connection");

        conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY)", []).expect("create table");
        {
            let tx = conn.transaction().expect("begin");
            tx.execute("INSERT INTO test (id) VALUES (1)", []).expect("insert");
        }

        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM test", [], |row| row.get(0)).expect("count");
        assert_eq!(count, 0);
    }
}
