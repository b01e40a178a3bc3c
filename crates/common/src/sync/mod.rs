//! Concurrency primitives for the storage layer
//!
//! ## Submodules
//!
//! - **`guild_lock`**: lazily created per-guild async mutexes
//! - **`debounce`**: per-key debounced update queue built on cancellable
//!   tokio tasks
//! - **`stats`**: atomic counters shared by the above and by the transaction
//!   runner in the infra crate

pub mod debounce;
pub mod guild_lock;
pub mod stats;

pub use debounce::{DebouncedUpdateQueue, DEFAULT_DEBOUNCE_DELAY};
pub use guild_lock::GuildLocks;
pub use stats::{ConcurrencyStats, ConcurrencyStatsSnapshot};
