//! Resilience patterns for transient failures
//!
//! - **Retry**: exponential backoff driven by
//!   [`ErrorClassification`](crate::error::ErrorClassification), used around
//!   SQLite writes that can hit `SQLITE_BUSY` / `SQLITE_LOCKED`.

pub mod retry;

pub use retry::{
    execute_with_retry, BackoffStrategy, ClassifiedRetryPolicy, RetryConfig, RetryConfigBuilder,
    RetryDecision, RetryExecutor, RetryPolicy,
};
