//! # Reminder Core
//!
//! Storage business logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - Feature flags with cascading fallback
//! - The storage backend port and the primary/fallback adapter
//! - The event manager used by the command layer
//!
//! ## Architecture Principles
//! - Depends only on `reminder-common` and `reminder-domain`
//! - No files, database or network code
//! - Backends are supplied through the [`StorageBackend`] trait

pub mod events;
pub mod feature_flags;
pub mod storage;

#[cfg(any(feature = "test-utils", test))]
pub mod testing;

pub use events::{ManagerState, ManagerStatus, UnifiedEventManager};
pub use feature_flags::{FeatureFlag, FeatureFlagManager, FlagState, FlagSummary};
pub use storage::{BackendKind, StorageAdapter, StorageBackend};
