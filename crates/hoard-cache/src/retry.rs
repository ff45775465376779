//! Retry with randomized exponential backoff.

use hoard_core::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Runs fallible operations up to a fixed number of attempts.
///
/// The growth factor is drawn once per call from `[2, 4)`; the delay before
/// retry `n` is `base_timeout_ms * factor^n`. After the last attempt the
/// error of that attempt is returned unchanged. Fatal errors (trust
/// violations, configuration errors) are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryExecutor {
    base_timeout_ms: u64,
    max_attempts: u32,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self {
            base_timeout_ms: 5,
            max_attempts: 6,
        }
    }
}

impl RetryExecutor {
    pub fn new(base_timeout_ms: u64, max_attempts: u32) -> Self {
        Self {
            base_timeout_ms,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (1-based) for a given growth factor.
    pub fn delay(&self, factor: f64, retry: u32) -> Duration {
        let millis = self.base_timeout_ms as f64 * factor.powi(retry as i32);
        Duration::from_micros((millis * 1000.0).round() as u64)
    }

    pub async fn run<F, Fut, T>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let factor: f64 = rand::thread_rng().gen_range(2.0..4.0);
        let mut attempt = 1;

        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = operation, attempts = attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_fatal() || attempt >= self.max_attempts => return Err(err),
                Err(err) => {
                    let delay = self.delay(factor, attempt);
                    warn!(
                        operation = operation,
                        attempt = attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %err,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
