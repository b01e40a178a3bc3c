//! Building blocks shared by the reminder storage crates
//!
//! Everything sits behind a cargo feature so the domain crate can take the
//! error vocabulary without pulling in tokio or SQLite:
//!
//! - `foundation`: [`CommonError`] and [`ErrorClassification`]
//! - `observability`: tracing
//! - `runtime`: retry executor, per-guild locks, the debounced save queue
//!   and concurrency counters
//! - `platform`: the r2d2 SQLite pool and [`StorageError`]

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

#[cfg(feature = "foundation")]
pub mod error;

#[cfg(feature = "runtime")]
pub mod resilience;
#[cfg(feature = "runtime")]
pub mod sync;

#[cfg(feature = "platform")]
pub mod storage;

#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use resilience::{execute_with_retry, BackoffStrategy, RetryConfig};
#[cfg(feature = "platform")]
pub use storage::{StorageError, StorageResult};
#[cfg(feature = "runtime")]
pub use sync::{ConcurrencyStats, ConcurrencyStatsSnapshot, DebouncedUpdateQueue, GuildLocks};
