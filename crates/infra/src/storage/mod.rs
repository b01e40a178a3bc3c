//! Concrete storage backends
//!
//! - [`JsonStorageBackend`]: the legacy flat file
//! - [`SqliteStorageBackend`]: pooled SQLite with schema migrations

pub mod backup;
pub mod json_backend;
pub mod sqlite_backend;

pub use backup::BackupFile;
pub use json_backend::JsonStorageBackend;
pub use sqlite_backend::SqliteStorageBackend;
