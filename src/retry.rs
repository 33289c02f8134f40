//! Retry utilities with exponential backoff for the backend chat client.
//!
//! Network-layer retries live here, behind the [`crate::client::ChatBackend`]
//! seam: the orchestrator never retries a backend call itself. Only transient
//! failures (transport errors, 429, 5xx) are retried; client errors surface
//! immediately.
//!
//! # Examples
//!
//! ```rust,no_run
//! use response_gateway::retry::{retry_transient, RetryConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RetryConfig::default()
//!     .with_max_attempts(3)
//!     .with_initial_delay(Duration::from_millis(250));
//!
//! let result = retry_transient(config, || async {
//!     Ok::<_, response_gateway::Error>(42)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first call)
    pub max_attempts: u32,

    /// Initial delay before first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (e.g., 2.0 doubles the delay each time)
    pub backoff_multiplier: f64,

    /// Width of the symmetric jitter window as a fraction of each delay
    /// (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum number of attempts
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set jitter factor (0.0 to 1.0)
    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before the retry following `attempt`: exponential backoff capped
    /// at `max_delay`, widened by a symmetric jitter window of
    /// `jitter_factor` times the delay.
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let base = scaled.min(self.max_delay.as_secs_f64());

        if self.jitter_factor <= 0.0 {
            return Duration::from_secs_f64(base);
        }

        let half_window = base * self.jitter_factor / 2.0;
        let offset = rand::thread_rng().gen_range(-half_window..=half_window);
        Duration::from_secs_f64((base + offset).max(0.0))
    }
}

/// Whether an error is transient and worth retrying at the network layer.
///
/// Transport failures, 429, and 5xx statuses qualify; everything else —
/// including 4xx upstream statuses — surfaces immediately.
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Http(_) => true,
        Error::Stream(_) => true,
        Error::Upstream { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

/// Retry an async operation with exponential backoff, only retrying on
/// transient errors (see [`is_retryable_error`]).
///
/// # Arguments
///
/// * `config` - Retry configuration
/// * `operation` - Async function to retry
///
/// # Returns
///
/// The result of the operation if successful, the first non-retryable error,
/// or the last transient error once attempts are exhausted.
pub async fn retry_transient<F, Fut, T>(config: RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !is_retryable_error(&err) {
                    return Err(err);
                }

                last_error = Some(err);

                // Don't sleep after the last attempt
                if attempt < config.max_attempts - 1 {
                    let delay = config.calculate_delay(attempt);
                    sleep(delay).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::stream("retry failed with no error")))
}
