//! Retry logic with exponential backoff
//!
//! This module provides configurable retry logic for transient failures.
//! It implements exponential backoff with optional jitter, and honors a
//! server-specified minimum wait (rate limits) when the error carries one.
//!
//! # Example
//!
//! ```no_run
//! use telegram_media_dl::retry::{IsRetryable, run_with_retry};
//! use telegram_media_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let result = run_with_retry(&config, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await.map_err(|e| e.error)?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, ErrorKind};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, server busy, rate limits) should return `true`.
/// Permanent failures (authentication failed, disk full, corrupt data) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;

    /// Server-specified minimum wait before the next attempt, if any
    ///
    /// When present, the retry delay is raised to at least this value even if
    /// the computed backoff delay is shorter.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Implementation of IsRetryable for our Error type
impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// An operation that failed on every attempt it was allowed
#[derive(Debug)]
pub struct RetryExhausted<E> {
    /// The error from the final attempt
    pub error: E,
    /// Total attempts made, including the first
    pub attempts: u32,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (after {} attempts)", self.error, self.attempts)
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Makes up to `config.max_attempts` total attempts (a zero value is treated
/// as one attempt). A permanent (non-retryable)
/// failure returns immediately; a transient failure sleeps and retries until
/// attempts run out. The sleep before retry `n` is
/// `initial_delay * backoff_multiplier^(n-1)`, capped at `max_delay`, raised to
/// the error's `retry_after()` hint when the server specified one, and jittered
/// when jitter is enabled.
///
/// # Arguments
///
/// * `config` - Retry configuration (max attempts, delays, backoff multiplier, jitter)
/// * `operation` - Async closure that returns Result<T, E> where E implements IsRetryable
///
/// # Returns
///
/// The successful result, or [`RetryExhausted`] carrying the final error and
/// the number of attempts made.
pub async fn run_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    // The fields are public, so a zero-attempt config can reach this
    // function without passing validation; treat it as a single attempt
    let max_attempts = config.max_attempts.max(1);
    let mut delay = config.initial_delay;

    for attempt in 1..=max_attempts {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                // Server-specified wait takes precedence over a shorter backoff
                let base_delay = match e.retry_after() {
                    Some(server_wait) => delay.max(server_wait),
                    None => delay,
                };

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts,
                    delay_ms = base_delay.as_millis(),
                    "Operation failed, retrying"
                );

                let jittered_delay = if config.jitter {
                    add_jitter(base_delay)
                } else {
                    base_delay
                };

                tokio::time::sleep(jittered_delay).await;

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(
                        error = %e,
                        attempt = attempt,
                        "Operation failed with non-retryable error"
                    );
                }
                return Err(RetryExhausted { error: e, attempts: attempt });
            }
        }
    }

    // max_attempts is clamped to at least 1 above, so the loop always
    // returns before reaching this point
    unreachable!("retry loop must return within max_attempts iterations")
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay.
/// This means the actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}
