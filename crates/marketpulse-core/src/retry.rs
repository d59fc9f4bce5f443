//! Bounded retry with non-decreasing backoff.

use std::future::Future;
use std::time::Duration;

use crate::MarketDataError;

/// Backoff strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Waits `base * attempt` after the given failed attempt.
    Linear {
        /// Delay after the first failure.
        base: Duration,
    },
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Linear {
            base: Duration::from_secs(1),
        }
    }
}

impl Backoff {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay(self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self {
            Self::Linear { base } => base.saturating_mul(attempt),
            Self::Fixed { delay } => delay,
        }
    }
}

/// Configuration for the retrying fetcher.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt. Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// The backoff strategy to use between retries.
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    /// Linear backoff: `delay * attempt`.
    pub fn linear(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Linear { base: delay },
        }
    }

    /// Create a new retry configuration with fixed backoff.
    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
        }
    }

    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Calculate the delay after a given failed attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}

/// Runs `operation` until it succeeds or the attempt budget is spent.
///
/// Non-retryable errors are returned as-is on first occurrence. Once all
/// attempts fail, the last error is returned inside [`MarketDataError::Fetch`].
pub async fn fetch_with_retry<T, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, MarketDataError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MarketDataError>>,
{
    let max_attempts = config.max_attempts();
    let mut attempt = 0_u32;

    loop {
        attempt += 1;
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !error.is_retryable() {
            return Err(error);
        }

        if attempt >= max_attempts {
            tracing::warn!(attempt, code = error.code(), %error, "giving up after final attempt");
            return Err(MarketDataError::Fetch {
                attempts: attempt,
                source: Box::new(error),
            });
        }

        let delay = config.delay_for_attempt(attempt);
        tracing::warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            code = error.code(),
            %error,
            "attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}
