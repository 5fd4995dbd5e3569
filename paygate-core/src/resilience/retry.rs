//! Retry pattern with configurable backoff strategies.
//!
//! ## Example
//!
//! ```rust,ignore
//! use paygate_core::resilience::retry_with_backoff;
//! use std::time::Duration;
//!
//! // Waits 100ms then 200ms between the three attempts.
//! let payment = retry_with_backoff(
//!     || provider.retrieve_payment("pi_123"),
//!     3,
//!     Duration::from_millis(100),
//! )
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff strategy for retries.
#[derive(Debug, Clone)]
pub enum BackoffStrategy {
    /// No delay between retries.
    None,
    /// Constant delay between retries.
    Constant(Duration),
    /// Linear backoff: delay increases by a fixed amount.
    Linear {
        initial: Duration,
        increment: Duration,
        max: Duration,
    },
    /// Exponential backoff: delay is multiplied each retry.
    Exponential {
        initial: Duration,
        multiplier: f64,
        max: Duration,
    },
    /// Exponential backoff plus up to 50% random jitter.
    ExponentialWithJitter {
        initial: Duration,
        multiplier: f64,
        max: Duration,
    },
}

impl BackoffStrategy {
    /// Create constant backoff.
    pub fn constant(delay: Duration) -> Self {
        Self::Constant(delay)
    }

    /// Create linear backoff.
    pub fn linear(initial: Duration, increment: Duration) -> Self {
        Self::Linear {
            initial,
            increment,
            max: Duration::from_secs(60),
        }
    }

    /// Create doubling backoff, capped at 60 seconds.
    pub fn exponential(initial: Duration) -> Self {
        Self::Exponential {
            initial,
            multiplier: 2.0,
            max: Duration::from_secs(60),
        }
    }

    /// Create doubling backoff with jitter, capped at 60 seconds.
    pub fn exponential_with_jitter(initial: Duration) -> Self {
        Self::ExponentialWithJitter {
            initial,
            multiplier: 2.0,
            max: Duration::from_secs(60),
        }
    }

    /// Set maximum delay.
    pub fn with_max(self, max: Duration) -> Self {
        match self {
            Self::Linear { initial, increment, .. } => Self::Linear { initial, increment, max },
            Self::Exponential { initial, multiplier, .. } => {
                Self::Exponential { initial, multiplier, max }
            }
            Self::ExponentialWithJitter { initial, multiplier, .. } => {
                Self::ExponentialWithJitter { initial, multiplier, max }
            }
            other => other,
        }
    }

    /// Delay to wait after the given (0-indexed) failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Constant(d) => *d,
            Self::Linear { initial, increment, max } => {
                initial.saturating_add(increment.saturating_mul(attempt)).min(*max)
            }
            Self::Exponential { initial, multiplier, max } => {
                scale(*initial, multiplier.powi(attempt as i32)).min(*max)
            }
            Self::ExponentialWithJitter { initial, multiplier, max } => {
                let base = scale(*initial, multiplier.powi(attempt as i32));
                let jitter = scale(base, rand::random::<f64>() * 0.5);
                base.saturating_add(jitter).min(*max)
            }
        }
    }
}

fn scale(duration: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(duration.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::exponential(Duration::from_millis(100))
    }
}

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including initial).
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::default(),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Returned once every attempt has failed.
#[derive(Debug)]
pub struct RetryError<E> {
    /// Last error encountered; `None` when no attempt ran.
    pub last_error: Option<E>,
    /// Number of attempts made.
    pub attempts: u32,
}

impl<E> RetryError<E> {
    pub fn into_last_error(self) -> Option<E> {
        self.last_error
    }
}

impl<E> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Operation failed after {} attempts", self.attempts)
    }
}

impl<E: std::fmt::Debug> std::error::Error for RetryError<E> {}

/// Retry executor.
#[derive(Debug, Clone)]
pub struct Retry {
    config: RetryConfig,
}

impl Retry {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute with retry logic.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.call_if(f, |_| true).await
    }

    /// Execute with retry logic, stopping early when `should_retry`
    /// rejects an error.
    pub async fn call_if<F, Fut, T, E, P>(
        &self,
        mut f: F,
        should_retry: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.config.max_attempts;
        let mut last_error: Option<E> = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = self.config.backoff.delay_for_attempt(attempt - 1);
                if delay > Duration::ZERO {
                    tokio::time::sleep(delay).await;
                }
            }

            match f().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(attempt = attempt + 1, "Retry succeeded");
                    }
                    return Ok(result);
                }
                Err(e) => {
                    let is_last_attempt = attempt + 1 >= max_attempts;

                    if !should_retry(&e) {
                        debug!(attempt = attempt + 1, error = %e, "Error is not retryable");
                        return Err(RetryError {
                            last_error: Some(e),
                            attempts: attempt + 1,
                        });
                    }

                    if is_last_attempt {
                        warn!(
                            attempt = attempt + 1,
                            max_attempts,
                            error = %e,
                            "Final retry attempt failed"
                        );
                    } else {
                        debug!(
                            attempt = attempt + 1,
                            next_delay = ?self.config.backoff.delay_for_attempt(attempt),
                            error = %e,
                            "Retry attempt failed, waiting before retry"
                        );
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(RetryError {
            last_error,
            attempts: max_attempts,
        })
    }
}

/// Run `op` up to `max_attempts` times. Before attempt `k > 0` it waits
/// `initial_delay * 2^(k-1)`, without jitter or cap.
///
/// `max_attempts == 0` fails immediately without calling `op`.
pub async fn retry_with_backoff<F, Fut, T, E>(
    op: F,
    max_attempts: u32,
    initial_delay: Duration,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let backoff = BackoffStrategy::exponential(initial_delay).with_max(Duration::MAX);
    Retry::new(RetryConfig::new(max_attempts).backoff(backoff))
        .call(op)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_retry_succeeds_on_first_try() {
        let retry = Retry::new(RetryConfig::new(3));

        let result: Result<i32, RetryError<&str>> = retry.call(|| async { Ok(42) }).await;

        let value = tokio_test::assert_ok!(result);
        assert_eq!(value, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_backoff_waits_exponentially() {
        let attempts = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let result: Result<&str, RetryError<&str>> = retry_with_backoff(
            || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                seen.lock().push(start.elapsed());
                async move {
                    if attempt < 2 {
                        Err("gateway timeout")
                    } else {
                        Ok("captured")
                    }
                }
            },
            3,
            Duration::from_millis(100),
        )
        .await;

        assert_eq!(result.unwrap(), "captured");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(
            *seen.lock(),
            vec![
                Duration::ZERO,
                Duration::from_millis(100),
                Duration::from_millis(300)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted() {
        let attempts = AtomicU32::new(0);

        let result: Result<i32, RetryError<&str>> = retry_with_backoff(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err("always fails") }
            },
            3,
            Duration::from_millis(10),
        )
        .await;

        let err = tokio_test::assert_err!(result);
        assert_eq!(err.to_string(), "Operation failed after 3 attempts");
        assert_eq!(err.attempts, 3);
        assert_eq!(err.last_error, Some("always fails"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_never_invokes() {
        let attempts = AtomicU32::new(0);

        let result: Result<i32, RetryError<&str>> = retry_with_backoff(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok(1) }
            },
            0,
            Duration::from_millis(10),
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Operation failed after 0 attempts");
        assert!(err.last_error.is_none());
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_call_if_stops_on_non_retryable() {
        let attempts = AtomicU32::new(0);
        let retry = Retry::new(RetryConfig::new(5).backoff(BackoffStrategy::None));

        let result: Result<(), RetryError<&str>> = retry
            .call_if(
                || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err("card declined") }
                },
                |e| *e != "card declined",
            )
            .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exponential_backoff() {
        let backoff = BackoffStrategy::exponential(Duration::from_millis(100));

        assert_eq!(backoff.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(backoff.delay_for_attempt(20), Duration::from_secs(60));
    }

    #[test]
    fn test_linear_and_jitter_bounds() {
        let linear = BackoffStrategy::linear(Duration::from_millis(100), Duration::from_millis(50));
        assert_eq!(linear.delay_for_attempt(2), Duration::from_millis(200));

        let jitter = BackoffStrategy::exponential_with_jitter(Duration::from_millis(100));
        let delay = jitter.delay_for_attempt(1);
        assert!(delay >= Duration::from_millis(200));
        assert!(delay <= Duration::from_millis(300));
    }
}
