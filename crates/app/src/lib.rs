//! # Reminder App
//!
//! Application layer - dependency injection and the operator CLI.
//!
//! This crate contains:
//! - Application context (dependency injection)
//! - `reminderctl` argument parsing and commands
//! - Tracing initialisation
//!
//! ## Architecture
//! - Depends on `common`, `domain`, `core`, and `infra`
//! - Wires the JSON and SQLite backends behind the storage adapter

pub mod cli;
pub mod commands;
pub mod context;
pub mod utils;

// Re-export for convenience
pub use cli::{Cli, Commands};
pub use commands::{execute, CommandOutput, StatusReport};
pub use context::AppContext;
