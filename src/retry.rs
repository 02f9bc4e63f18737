//! Retry utilities with exponential backoff and jitter.
//!
//! Transient failures against external systems (the Prometheus endpoint,
//! the Kubernetes API) should not immediately kill a polling loop. This
//! module provides a bounded retry mechanism with exponential backoff and
//! jitter; when the attempts are exhausted the last error is returned and
//! the caller decides how fatal that is.
//!
//! # Example
//!
//! ```ignore
//! use conditioner::retry::{retry_with_backoff, RetryConfig};
//!
//! let verdict = retry_with_backoff(
//!     &RetryConfig::evaluation(),
//!     "evaluate probe",
//!     || async { probe.evaluate().await },
//! ).await?;
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Configuration for operations that may fail transiently.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total number of attempts before giving up (at least 1)
    pub attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on the delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: crate::DEFAULT_EVALUATION_ATTEMPTS,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Config used for probe evaluations inside a worker tick
    ///
    /// Kept short so a slow signal backend delays the tick, not the whole
    /// worker lifecycle.
    pub fn evaluation() -> Self {
        Self::default()
    }

    /// Create a config with a specific number of attempts
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            ..Default::default()
        }
    }
}

/// Execute an async operation, retrying with exponential backoff and jitter.
///
/// Runs the operation up to `config.attempts` times. Returns the first
/// success, or the last error once the attempts are exhausted.
///
/// # Arguments
/// * `config` - Retry configuration
/// * `operation_name` - Name for logging purposes
/// * `operation` - The async operation to retry
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = config.attempts.max(1);
    let mut delay = config.initial_delay;

    for attempt in 1..=attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt == attempts => {
                error!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    "Operation failed after final attempt"
                );
                return Err(e);
            }
            Err(e) => {
                // Jitter: 0.5x to 1.5x of the current delay
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = jittered_delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(jittered_delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }

    unreachable!("loop returns on the final attempt")
}
