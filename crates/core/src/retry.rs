//! Bounded retries with linear backoff.
//!
//! Capability services never retry on their own; the resolver and the install
//! pipeline wrap their network calls with [`RetryPolicy::run`]. Only
//! [`Error::is_transient`](crate::Error::is_transient) failures are retried.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::Result;

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retries: u32,
    backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::linear(2, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// Retry `retries` times, waiting `backoff * attempt` after each failure.
    #[must_use]
    pub const fn linear(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }

    /// Retry without waiting. Used by tests.
    #[must_use]
    pub const fn immediate(retries: u32) -> Self {
        Self::linear(retries, Duration::ZERO)
    }

    /// A single attempt.
    #[must_use]
    pub const fn none() -> Self {
        Self::immediate(0)
    }

    /// Total attempts including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.retries + 1
    }

    /// Delay after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `op`.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts() => {
                    let delay = self.delay_for(attempt);
                    debug!(%what, attempt, ?delay, error = %err, "Transient failure, retrying");
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
