//! Event management

pub mod manager;

pub use manager::{ManagerState, ManagerStatus, UnifiedEventManager};
