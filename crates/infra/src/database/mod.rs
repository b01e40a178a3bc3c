//! Database implementations

pub mod event_repository;
pub mod manager;
pub mod migrations;
pub mod transaction;

pub use event_repository::{SqliteEventRepository, TableCounts};
pub use manager::DbManager;
pub use migrations::{latest_version, Migration, MIGRATIONS};
pub use transaction::TransactionRunner;
