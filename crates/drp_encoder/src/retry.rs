//! Bounded retry with exponential backoff for model invocations.
//!
//! Only failures the model marks transient are retried; deterministic
//! failures surface immediately.

use std::thread;
use std::time::Duration;

use crate::ModelFailure;

/// Retry policy for transient model failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Maximum retry attempts after the initial try.
    pub max_retries: u32,
    /// Initial backoff delay.
    pub base_delay: Duration,
    /// Delay ceiling.
    pub max_delay: Duration,
    /// Exponential backoff multiplier.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_base_delay_ms(mut self, millis: u64) -> Self {
        self.base_delay = Duration::from_millis(millis);
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Backoff delay for a retry attempt (1-indexed; attempt 0 is the
    /// initial try and never sleeps).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponential = self.base_delay.as_millis() as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);
        let delay_ms = exponential.min(self.max_delay.as_millis() as f64) as u64;
        Duration::from_millis(delay_ms)
    }
}

/// Run `operation` with bounded retries of transient failures.
///
/// The closure receives the attempt number (0 for the initial try).
pub fn execute_with_retry<T, F>(config: &RetryConfig, mut operation: F) -> Result<T, ModelFailure>
where
    F: FnMut(u32) -> Result<T, ModelFailure>,
{
    let mut last_failure: Option<ModelFailure> = None;

    for attempt in 0..=config.max_retries {
        match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(failure) => {
                let retryable = failure.transient && attempt < config.max_retries;
                last_failure = Some(failure);
                if !retryable {
                    break;
                }
                let delay = config.calculate_delay(attempt + 1);
                if delay > Duration::ZERO {
                    thread::sleep(delay);
                }
            }
        }
    }

    Err(last_failure
        .unwrap_or_else(|| ModelFailure::permanent("retry loop produced no result")))
}
