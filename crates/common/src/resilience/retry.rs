//! Retry with exponential backoff for transient failures
//!
//! Errors are retried only when the policy says so. The default policy
//! ([`ClassifiedRetryPolicy`]) defers to [`ErrorClassification::is_retryable`],
//! which for SQLite means `BUSY` / `LOCKED` and pool exhaustion. When the
//! attempts are exhausted the last error is returned unchanged so callers can
//! keep mapping it into their own error types.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ErrorClassification;

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// Exponential backoff: `initial_delay * base^attempt`, capped at
    /// `max_delay`
    Exponential { initial_delay: Duration, base: f64, max_delay: Duration },
}

impl BackoffStrategy {
    /// Calculate the delay before retry number `attempt` (0-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed(delay) => *delay,
            BackoffStrategy::Exponential { initial_delay, base, max_delay } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let delay_ms = initial_delay.as_millis() as f64 * base.powi(exponent);
                let max_ms = max_delay.as_millis() as f64;
                if delay_ms.is_finite() && delay_ms >= 0.0 && delay_ms < max_ms {
                    Duration::from_millis(delay_ms as u64)
                } else {
                    *max_delay
                }
            }
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt; `0` disables retrying
    pub max_retries: u32,
    pub backoff: BackoffStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_millis(100),
                base: 2.0,
                max_delay: Duration::from_secs(2),
            },
        }
    }
}

impl RetryConfig {
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }

    /// Configuration that never retries
    pub fn no_retry() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    pub fn exponential_backoff(mut self, initial_delay: Duration, max_delay: Duration) -> Self {
        self.config.backoff =
            BackoffStrategy::Exponential { initial_delay, base: 2.0, max_delay };
        self
    }

    pub fn build(self) -> RetryConfig {
        self.config
    }
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Stop,
}

/// Trait for determining whether an error should be retried
pub trait RetryPolicy<E> {
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Retries exactly the errors classified as retryable
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifiedRetryPolicy;

impl<E: ErrorClassification> RetryPolicy<E> for ClassifiedRetryPolicy {
    fn should_retry(&self, error: &E, _attempt: u32) -> RetryDecision {
        if error.is_retryable() {
            RetryDecision::Retry
        } else {
            RetryDecision::Stop
        }
    }
}

type RetryObserver = Arc<dyn Fn(u32, Duration) + Send + Sync>;

/// The retry executor
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
    on_retry: Option<RetryObserver>,
}

impl<P> RetryExecutor<P> {
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy, on_retry: None }
    }

    /// Register a callback invoked before each retry with the retry number
    /// (1-based) and the delay about to be slept
    pub fn on_retry(mut self, observer: impl Fn(u32, Duration) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(observer));
        self
    }

    /// Execute an operation, retrying per the policy and backoff
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if self.policy.should_retry(&error, attempt) == RetryDecision::Stop {
                        return Err(error);
                    }
                    if attempt >= self.config.max_retries {
                        warn!(
                            attempts = attempt + 1,
                            error = %error,
                            "retry attempts exhausted"
                        );
                        return Err(error);
                    }

                    let delay = self.config.backoff.calculate_delay(attempt);
                    attempt += 1;
                    warn!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "transient failure, retrying"
                    );
                    if let Some(observer) = &self.on_retry {
                        observer(attempt, delay);
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Run `operation`, retrying errors classified retryable with exponential
/// delay. Non-retryable errors return immediately; after `max_retries`
/// retries the last error is returned.
pub async fn execute_with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    E: ErrorClassification + fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    RetryExecutor::new(config.clone(), ClassifiedRetryPolicy).execute(operation).await
}
