//! r2d2 pool over plain SQLite files

pub mod config;
pub mod connection;
pub mod pool;

pub use config::SqlitePoolConfig;
pub use connection::SqliteConnection;
pub use pool::SqlitePool;
