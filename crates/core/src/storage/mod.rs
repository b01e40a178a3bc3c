//! Dual-backend storage

pub mod adapter;
pub mod ports;

pub use adapter::StorageAdapter;
pub use ports::{BackendKind, StorageBackend};
