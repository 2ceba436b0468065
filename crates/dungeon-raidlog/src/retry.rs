//! Exponential backoff for raid log downloads.
//!
//! The game server drops connections under load, so a fetch is retried a
//! bounded number of times. Only transient failures are retried; a redirect
//! to the login or maintenance page is returned immediately.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::FetchError;

/// Attempts, first delay and growth factor of a retried operation.
///
/// After the `k`-th failed attempt (1-based) the caller sleeps
/// `initial_delay * scale_factor^(k-1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub num_tries: u32,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each further failure.
    pub scale_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            num_tries: 5,
            initial_delay: Duration::from_millis(500),
            scale_factor: 2,
        }
    }
}

impl RetryPolicy {
    /// Create a policy.
    pub const fn new(num_tries: u32, initial_delay: Duration, scale_factor: u32) -> Self {
        Self {
            num_tries,
            initial_delay,
            scale_factor,
        }
    }

    /// Sleep duration after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.scale_factor
            .checked_pow(attempt.saturating_sub(1))
            .map_or(Duration::MAX, |factor| self.initial_delay.saturating_mul(factor))
    }

    /// Run `op` until it succeeds, fails permanently, or runs out of tries.
    ///
    /// # Errors
    ///
    /// Returns the first non-transient error unchanged, or
    /// [`FetchError::RetriesExhausted`] wrapping the last transient error.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let max_attempts = self.num_tries.max(1);
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            debug!(operation, attempt, max_attempts, "attempting");

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    return Err(FetchError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
