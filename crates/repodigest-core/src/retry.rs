//! Retry with exponential backoff.
//!
//! [`RetryPolicy`] wraps any fallible async operation. Only errors that report
//! themselves as transient (via [`Transient`]) are retried; definitive errors
//! return immediately. Every failed attempt is reported to an observer so call
//! sites can log without re-implementing the loop.

use std::future::Future;
use std::time::Duration;

use repodigest_config::RetryConfig;

/// Classifies an error as worth retrying.
pub trait Transient {
    /// `true` for network-class failures (timeouts, rate limits, 5xx).
    fn is_transient(&self) -> bool;
}

/// A failed attempt, as seen by the observer.
#[derive(Debug)]
pub struct RetryEvent<'a, E> {
    /// 1-based attempt number that just failed.
    pub attempt: u32,
    /// Attempt budget of the policy.
    pub max_attempts: u32,
    /// The error returned by this attempt.
    pub error: &'a E,
    /// Backoff before the next attempt; `None` when no retry follows.
    pub next_delay: Option<Duration>,
}

/// Exponential backoff policy: `min(base * 2^(attempt-1), max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Policy for repository metadata and tree calls.
    pub fn for_metadata(config: &RetryConfig) -> Self {
        Self::new(
            config.metadata_attempts,
            config.base_delay(),
            config.max_delay(),
        )
    }

    /// Policy for individual blob calls.
    pub fn for_blobs(config: &RetryConfig) -> Self {
        Self::new(config.blob_attempts, config.base_delay(), config.max_delay())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after `attempt` (1-based) fails.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails definitively, or the budget runs out.
    ///
    /// The last error is returned when all attempts fail.
    pub async fn run<T, E, Op, Fut, Obs>(&self, mut op: Op, mut observer: Obs) -> Result<T, E>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient,
        Obs: FnMut(RetryEvent<'_, E>),
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let retry = error.is_transient() && attempt < self.max_attempts;
                    let next_delay = retry.then(|| self.delay_after(attempt));
                    observer(RetryEvent {
                        attempt,
                        max_attempts: self.max_attempts,
                        error: &error,
                        next_delay,
                    });
                    match next_delay {
                        Some(delay) => {
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        None => return Err(error),
                    }
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::for_metadata(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Flaky,
        Fatal,
    }

    impl Transient for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, TestError::Flaky)
        }
    }

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1), Duration::from_millis(4))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
        assert_eq!(policy.delay_after(4), Duration::from_secs(8));
        assert_eq!(policy.delay_after(5), Duration::from_secs(10));
        assert_eq!(policy.delay_after(40), Duration::from_secs(10));
    }

    #[test]
    fn test_defaults_from_config() {
        let config = RetryConfig::default();
        assert_eq!(RetryPolicy::for_metadata(&config).max_attempts(), 3);
        assert_eq!(RetryPolicy::for_blobs(&config).max_attempts(), 2);
    }

    #[test]
    fn test_zero_attempts_clamped() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let mut observed = Vec::new();

        let result = fast(3)
            .run(
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 3 {
                            Err(TestError::Flaky)
                        } else {
                            Ok("content")
                        }
                    }
                },
                |event| observed.push((event.attempt, event.next_delay.is_some())),
            )
            .await;

        assert_eq!(result, Ok("content"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(observed, vec![(1, true), (2, true)]);
    }

    #[tokio::test]
    async fn test_definitive_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let mut observed = 0;

        let result: Result<(), _> = fast(3)
            .run(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(TestError::Fatal) }
                },
                |event| {
                    assert!(event.next_delay.is_none());
                    observed += 1;
                },
            )
            .await;

        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(observed, 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let mut last_event = None;

        let result: Result<(), _> = fast(2)
            .run(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(TestError::Flaky) }
                },
                |event| last_event = Some((event.attempt, event.max_attempts, event.next_delay)),
            )
            .await;

        assert_eq!(result, Err(TestError::Flaky));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(last_event, Some((2, 2, None)));
    }
}
