//! # Reminder Infrastructure
//!
//! Infrastructure implementations of the core storage port.
//!
//! This crate contains:
//! - The JSON flat-file and SQLite storage backends
//! - SQLite connection management, schema migrations and the guild-scoped
//!   transaction runner
//! - JSON → SQLite migration, rollback and verification tooling
//! - Configuration loading (file and environment)
//!
//! ## Architecture
//! - Implements `StorageBackend` from `reminder-core`
//! - Depends on `reminder-common`, `reminder-domain` and `reminder-core`
//! - Contains all "impure" code (file system, database)

pub mod config;
pub mod database;
pub mod errors;
pub mod migration;
pub mod storage;

// Re-export commonly used items
pub use database::{DbManager, SqliteEventRepository, TableCounts, TransactionRunner};
pub use errors::InfraError;
pub use migration::{
    JsonToSqliteMigrator, MigrationOptions, MigrationReport, MigrationVerifier, RollbackManager,
};
pub use storage::{BackupFile, JsonStorageBackend, SqliteStorageBackend};
