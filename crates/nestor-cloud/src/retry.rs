//! Bounded retry with exponential backoff

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Whether a failed call may succeed if attempted again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    Terminal,
}

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_delay: Duration,

    /// Upper bound for a single delay
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            ..Self::default()
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.backoff_multiplier).min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// The policy classified the error as terminal
    Terminal(E),
    /// Every attempt failed with a retryable error
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Terminal(error) => error,
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

/// Runs `operation` until it succeeds, fails terminally or runs out of attempts.
///
/// The operation is called at most `max_attempts` times (at least once). The
/// delay doubles after every retryable failure, capped at `max_delay`.
pub async fn with_retry<T, E, Op, Fut, Policy>(
    config: &RetryConfig,
    policy: Policy,
    mut operation: Op,
) -> Result<T, RetryError<E>>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Policy: Fn(&E) -> RetryClass,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay = config.initial_delay;
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if policy(&error) == RetryClass::Terminal {
                    debug!(attempt, error = %error, "terminal failure");
                    return Err(RetryError::Terminal(error));
                }
                if attempt >= max_attempts {
                    warn!(attempts = attempt, error = %error, "retries exhausted");
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: error,
                    });
                }
                debug!(attempt, max_attempts, delay_ms = delay.as_millis() as u64, error = %error, "retrying");
                tokio::time::sleep(delay).await;
                delay = config.next_delay(delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig::new(max_attempts, Duration::from_millis(10))
    }

    fn always_retry(_: &String) -> RetryClass {
        RetryClass::Retryable
    }

    #[tokio::test]
    async fn test_exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast(3), always_retry, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("throttled".to_string()) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 3,
                last: "throttled".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_terminal_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast(3), |_: &String| RetryClass::Terminal, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("denied".to_string()) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result, Err(RetryError::Terminal("denied".to_string())));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast(3), always_retry, || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err("propagating".to_string())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_calls_once() {
        let calls = AtomicU32::new(0);
        let _: Result<(), _> = with_retry(&fast(0), always_retry, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("x".to_string()) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_is_capped() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(5),
            ..RetryConfig::default()
        };
        assert_eq!(config.next_delay(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(config.next_delay(Duration::from_secs(4)), Duration::from_secs(5));
    }
}
