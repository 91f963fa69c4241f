//! Retry logic for exchange HTTP requests and Telegram sends with
//! exponential backoff.
//!
//! Public market endpoints throttle and occasionally return 5xx; a short
//! retry loop keeps one bad response from blanking an exchange in a report.
//! A Telegram `RetryAfter` answer sets the delay itself.

use crate::core::error::AppError;
use crate::core::metrics;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Retry-related errors.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// All retries exhausted (or the error was not retryable)
    #[error("Max retries ({max_retries}) exhausted")]
    MaxRetriesExhausted { max_retries: u32, last_error: E },
}

impl<E> RetryError<E> {
    /// Returns the error from the last attempt.
    pub fn into_last_error(self) -> E {
        match self {
            RetryError::MaxRetriesExhausted { last_error, .. } => last_error,
        }
    }
}

/// Retry strategy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub fn no_jitter(mut self) -> Self {
        self.add_jitter = false;
        self
    }

    /// No retries at all; used by tests hitting mock servers.
    pub fn none() -> Self {
        Self::default().max_retries(0)
    }

    /// Calculates delay for a given attempt number (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay.as_secs_f64());

        let final_delay = if self.add_jitter {
            // Add up to 25% jitter
            let jitter = rand::random::<f64>() * 0.25 * capped_delay;
            capped_delay + jitter
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}

/// Result of a retry loop.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    pub result: Result<T, RetryError<E>>,
    pub attempts: u32,
    pub total_duration: Duration,
}

impl<T, E> RetryResult<T, E> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn is_exhausted(&self) -> bool {
        self.result.is_err()
    }

    /// Flattens into the value or the last error.
    pub fn into_result(self) -> Result<T, E> {
        self.result.map_err(RetryError::into_last_error)
    }
}

/// Determines if an error is retryable.
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Optional server hint for the delay.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for reqwest::Error {
    fn is_retryable(&self) -> bool {
        if self.is_timeout() || self.is_connect() || self.is_request() {
            return true;
        }
        self.status().map(is_retryable_status).unwrap_or(false)
    }
}

impl Retryable for AppError {
    fn is_retryable(&self) -> bool {
        match self {
            AppError::Http(e) => e.is_retryable(),
            AppError::HttpStatus(status) => is_retryable_status(*status),
            AppError::Io(_) => true,
            _ => false,
        }
    }
}

#[cfg(feature = "telegram")]
impl Retryable for teloxide::RequestError {
    fn is_retryable(&self) -> bool {
        match self {
            teloxide::RequestError::Network(_) => true,
            teloxide::RequestError::RetryAfter(_) => true,
            teloxide::RequestError::Api(api_error) => {
                let error_str = format!("{:?}", api_error);
                error_str.contains("Bad Gateway")
                    || error_str.contains("Service Unavailable")
                    || error_str.contains("Gateway Timeout")
                    || error_str.contains("Too Many Requests")
            }
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        if let teloxide::RequestError::RetryAfter(seconds) = self {
            Some(seconds.duration())
        } else {
            None
        }
    }
}

fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

/// Executes an async operation with retry logic.
pub async fn retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Debug,
{
    let start = std::time::Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation().await {
            Ok(value) => {
                return RetryResult {
                    result: Ok(value),
                    attempts,
                    total_duration: start.elapsed(),
                };
            }
            Err(e) if attempts <= config.max_retries && e.is_retryable() => {
                metrics::HTTP_RETRIES_TOTAL
                    .with_label_values(&[&attempts.to_string()])
                    .inc();

                let delay = e
                    .retry_after()
                    .unwrap_or_else(|| config.delay_for_attempt(attempts - 1));

                log::warn!(
                    "Attempt {}/{} failed (retrying in {:?}): {:?}",
                    attempts,
                    config.max_retries + 1,
                    delay,
                    e
                );

                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return RetryResult {
                    result: Err(RetryError::MaxRetriesExhausted {
                        max_retries: config.max_retries,
                        last_error: e,
                    }),
                    attempts,
                    total_duration: start.elapsed(),
                };
            }
        }
    }
}
