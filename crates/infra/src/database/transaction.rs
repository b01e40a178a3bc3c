//! Guild-scoped SQLite transactions
//!
//! `with_transaction` holds the guild's async lock for the whole attempt
//! (including retries), runs the closure on a blocking thread inside one
//! rusqlite transaction, and commits only when the closure returns `Ok`.
//! Any error, or a panic unwinding through the closure, drops the
//! transaction, which rolls it back.

use std::sync::Arc;

use reminder_common::resilience::{execute_with_retry, RetryConfig};
use reminder_common::storage::{StorageError, StorageResult};
use reminder_common::{ConcurrencyStats, CommonError, GuildLocks};
use rusqlite::Transaction;
use tokio::task;
use tracing::{debug, warn};

use super::manager::DbManager;

/// Runs closures inside retried, per-guild-serialized transactions
#[derive(Clone)]
pub struct TransactionRunner {
    db: Arc<DbManager>,
    locks: Arc<GuildLocks>,
    stats: Arc<ConcurrencyStats>,
    retry: RetryConfig,
}

impl TransactionRunner {
    pub fn new(db: Arc<DbManager>, stats: Arc<ConcurrencyStats>) -> Self {
        let locks = Arc::new(GuildLocks::with_stats(Arc::clone(&stats)));
        Self { db, locks, stats, retry: RetryConfig::default() }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn stats(&self) -> &Arc<ConcurrencyStats> {
        &self.stats
    }

    pub fn locks(&self) -> &Arc<GuildLocks> {
        &self.locks
    }

    /// Run `op` in a transaction while holding `guild_id`'s lock
    pub async fn with_transaction<T, F>(&self, guild_id: u64, op: F) -> StorageResult<T>
    where
        F: Fn(&Transaction<'_>) -> StorageResult<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        let _guard = self.locks.acquire(guild_id).await;
        debug!(guild_id, "Guild transaction lock acquired");
        self.run(op).await
    }

    /// Run `op` in a transaction without a guild lock
    ///
    /// For operations spanning every guild, such as bulk migration or
    /// clearing tables.
    pub async fn run<T, F>(&self, op: F) -> StorageResult<T>
    where
        F: Fn(&Transaction<'_>) -> StorageResult<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        let op = Arc::new(op);
        let mut attempt = 0_u32;
        execute_with_retry(&self.retry, || {
            attempt += 1;
            if attempt > 1 {
                self.stats.record_retry();
            }
            let db = Arc::clone(&self.db);
            let stats = Arc::clone(&self.stats);
            let op = Arc::clone(&op);
            async move {
                task::spawn_blocking(move || run_in_transaction(&db, &stats, op.as_ref()))
                    .await
                    .map_err(join_error)?
            }
        })
        .await
    }
}

fn run_in_transaction<T, F>(db: &DbManager, stats: &ConcurrencyStats, op: &F) -> StorageResult<T>
where
    F: Fn(&Transaction<'_>) -> StorageResult<T>,
{
    let mut conn = db.pool().get_sqlite_connection()?;
    stats.record_connection_opened();
    let tx = conn.transaction()?;

    match op(&tx) {
        Ok(value) => match tx.commit() {
            Ok(()) => {
                stats.record_commit();
                Ok(value)
            }
            Err(err) => {
                stats.record_rollback();
                warn!(error = %err, "Transaction commit failed");
                Err(err.into())
            }
        },
        Err(err) => {
            drop(tx);
            stats.record_rollback();
            debug!(error = %err, "Transaction rolled back");
            Err(err)
        }
    }
}

fn join_error(err: task::JoinError) -> StorageError {
    StorageError::Common(CommonError::internal_ctx(
        "transaction",
        format!("transaction task failed: {err}"),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    fn runner(dir: &TempDir) -> TransactionRunner {
        let db = Arc::new(DbManager::new(dir.path().join("tx.db"), 2).expect("db"));
        db.run_migrations().expect("migrate");
        TransactionRunner::new(db, Arc::new(ConcurrencyStats::new())).with_retry(
            RetryConfig::builder()
                .max_retries(3)
                .fixed_backoff(Duration::from_millis(5))
                .build(),
        )
    }

    fn guild_count(runner: &TransactionRunner) -> i64 {
        let conn = runner.db.get_connection().expect("conn");
        conn.query_row("SELECT COUNT(*) FROM guild", [], |row| row.get(0)).expect("count")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn commits_on_ok() {
        let dir = TempDir::new().expect("temp dir");
        let runner = runner(&dir);

        runner
            .with_transaction(1, |tx| {
                tx.execute(
                    "INSERT INTO guild (guild_id, name, created_at, updated_at) VALUES (1, 'g', 0, 0)",
                    [],
                )?;
                Ok(())
            })
            .await
            .expect("commit");

        assert_eq!(guild_count(&runner), 1);
        assert_eq!(runner.stats().snapshot().transactions_committed, 1);
    }

    /// Tests that a failing closure leaves nothing behind
    #[tokio::test(flavor = "multi_thread")]
    async fn rolls_back_on_err() {
        let dir = TempDir::new().expect("temp dir");
        let runner = runner(&dir);

        let result: StorageResult<()> = runner
            .with_transaction(1, |tx| {
                tx.execute(
                    "INSERT INTO guild (guild_id, name, created_at, updated_at) VALUES (1, 'g', 0, 0)",
                    [],
                )?;
                Err(StorageError::Integrity("abort after first insert".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(guild_count(&runner), 0);
        let snapshot = runner.stats().snapshot();
        assert_eq!(snapshot.transactions_rolled_back, 1);
        assert_eq!(snapshot.transactions_committed, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn busy_errors_are_retried() {
        let dir = TempDir::new().expect("temp dir");
        let runner = runner(&dir);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        runner
            .run(move |_tx| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(StorageError::Rusqlite(rusqlite::Error::SqliteFailure(
                        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
                        None,
                    )));
                }
                Ok(())
            })
            .await
            .expect("second attempt succeeds");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(runner.stats().snapshot().retries, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_retryable_errors_fail_fast() {
        let dir = TempDir::new().expect("temp dir");
        let runner = runner(&dir);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let result: StorageResult<()> = runner
            .run(move |_tx| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StorageError::Integrity("bad row".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
