//! # Reminder Domain
//!
//! Domain types for the reminder bot storage layer.
//!
//! This crate contains:
//! - Watched events, guilds, users and reactions
//! - The storage document exchanged with every backend
//! - Domain error types and Result definitions
//! - Configuration structures
//! - Domain constants (snowflake bounds, length limits)
//!
//! ## Architecture
//! - No dependencies on other reminder crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
