//! SQLite storage primitives
//!
//! An r2d2 connection pool that applies the connection pragmas on every
//! checkout, its counters, and the error type shared by the SQLite code in
//! the infra crate.

pub mod error;
pub mod metrics;
pub mod sqlite;

pub use error::{StorageError, StorageResult};
pub use metrics::{PoolHealth, PoolMetrics, PoolStats};
pub use sqlite::{SqliteConnection, SqlitePool, SqlitePoolConfig};
