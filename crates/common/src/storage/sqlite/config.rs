//! Pool sizing and per-connection pragmas

use std::time::Duration;

use rusqlite::Connection;

#[derive(Debug, Clone)]
pub struct SqlitePoolConfig {
    pub max_size: u32,
    /// How long a checkout waits for a free connection
    pub connection_timeout: Duration,
    /// How long a statement waits on another writer's lock
    pub busy_timeout: Duration,
    pub enable_wal: bool,
    /// Needed for the `ON DELETE CASCADE` from events to reactions
    pub enable_foreign_keys: bool,
}

impl SqlitePoolConfig {
    /// Defaults with `max_size` clamped to at least one connection
    pub fn with_max_size(max_size: u32) -> Self {
        Self { max_size: max_size.max(1), ..Self::default() }
    }

    fn pragma_batch(&self) -> String {
        let mut batch = String::from("PRAGMA synchronous=NORMAL;");
        if self.enable_wal {
            batch.push_str("PRAGMA journal_mode=WAL;PRAGMA wal_autocheckpoint=1000;");
        }
        let foreign_keys = if self.enable_foreign_keys { "ON" } else { "OFF" };
        batch.push_str(&format!("PRAGMA foreign_keys={foreign_keys};"));
        batch
    }

    /// Run on every connection the pool opens
    pub fn apply(&self, conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(&self.pragma_batch())?;
        conn.busy_timeout(self.busy_timeout)
    }
}

impl Default for SqlitePoolConfig {
    fn default() -> Self {
        Self {
            max_size: 4,
            connection_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            enable_wal: true,
            enable_foreign_keys: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn pragma<T: rusqlite::types::FromSql>(conn: &Connection, name: &str) -> T {
        conn.pragma_query_value(None, name, |row| row.get(0)).expect("pragma readable")
    }

    #[test]
    fn zero_pool_size_is_clamped() {
        assert_eq!(SqlitePoolConfig::with_max_size(0).max_size, 1);
        assert_eq!(SqlitePoolConfig::with_max_size(6).max_size, 6);
    }

    /// Tests that the default pragmas switch on WAL, NORMAL sync and foreign keys
    #[test]
    fn default_pragmas_applied() {
        let temp_dir = TempDir::new().expect("temp dir");
        let conn = Connection::open(temp_dir.path().join("bot.db")).expect("open db");

        SqlitePoolConfig::default().apply(&conn).expect("pragmas applied");

        assert_eq!(pragma::<String>(&conn, "journal_mode").to_lowercase(), "wal");
        assert_eq!(pragma::<i32>(&conn, "synchronous"), 1);
        assert_eq!(pragma::<i32>(&conn, "foreign_keys"), 1);
    }

    #[test]
    fn foreign_keys_can_be_switched_off() {
        let temp_dir = TempDir::new().expect("temp dir");
        let conn = Connection::open(temp_dir.path().join("bot.db")).expect("open db");
        let config = SqlitePoolConfig { enable_foreign_keys: false, ..SqlitePoolConfig::default() };

        config.apply(&conn).expect("pragmas applied");

        assert_eq!(pragma::<i32>(&conn, "foreign_keys"), 0);
    }
}
