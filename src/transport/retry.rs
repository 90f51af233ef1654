//! Exponential backoff retry with jitter.
//!
//! A single retry primitive serves both adapter HTTP calls and LLM calls: the
//! operation is passed in as a closure returning a future, and the primitive
//! suspends for its backoff sleeps on the shared executor.

use crate::{OracleError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Tuned for raw network operations.
    pub fn network() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter: true,
        }
    }

    /// Tuned for oracle provider calls, which are more expensive to repeat.
    pub fn provider() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            backoff_factor: 3.0,
            jitter: true,
        }
    }

    /// Tuned for lightweight API calls.
    pub fn api() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter: true,
        }
    }

    /// Delay before retrying `attempt` (1-based): `min(max_delay,
    /// base * factor^(attempt-1))`, scaled by `0.5 + rand[0, 0.5)` when jitter
    /// is on.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.backoff_factor.powi(attempt.saturating_sub(1) as i32);
        let mut delay = self.base_delay.as_secs_f64() * exp;
        delay = delay.min(self.max_delay.as_secs_f64());
        if self.jitter {
            let factor: f64 = 0.5 + rand::thread_rng().gen_range(0.0..0.5);
            delay *= factor;
        }
        Duration::from_secs_f64(delay)
    }
}

/// Execute `op` with retry logic.
///
/// The closure receives the 1-based attempt number. Only retriable errors
/// (rate limit, timeout, network, 5xx provider) trigger another attempt;
/// everything else surfaces immediately. A rate-limit error with a
/// `retry_after` hint extends the backoff to honor it.
pub async fn retry_async<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retriable() {
                    warn!(attempt, error = %err, "non-retriable error, giving up");
                    return Err(err);
                }

                if attempt == config.max_attempts {
                    error!(
                        attempts = config.max_attempts,
                        error = %err,
                        "all retry attempts exhausted"
                    );
                    last_error = Some(err);
                    break;
                }

                let mut delay = config.delay_for_attempt(attempt);
                if let OracleError::RateLimited {
                    retry_after_secs: Some(secs),
                    ..
                } = &err
                {
                    delay = delay.max(Duration::from_secs(*secs));
                }
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying");
                last_error = Some(err);
                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| OracleError::Internal(anyhow::anyhow!("retry loop exited early"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn no_jitter(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn delay_follows_geometric_series_without_jitter() {
        let config = no_jitter(4);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
        // Total sleep over n attempts equals b * (f^n - 1) / (f - 1)
        let total: Duration = (1..=3).map(|a| config.delay_for_attempt(a)).sum();
        assert_eq!(total, Duration::from_millis(700));
    }

    #[test]
    fn delay_is_capped_at_max() {
        let config = RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            backoff_factor: 10.0,
            jitter: false,
        };
        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_half_to_full() {
        let config = RetryConfig {
            jitter: true,
            ..no_jitter(3)
        };
        for _ in 0..100 {
            let delay = config.delay_for_attempt(2);
            assert!(delay >= Duration::from_millis(100), "delay {delay:?}");
            assert!(delay < Duration::from_millis(200), "delay {delay:?}");
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let config = RetryConfig {
            base_delay: Duration::from_millis(1),
            jitter: false,
            ..no_jitter(3)
        };

        let result = retry_async(&config, move |_| {
            let calls = calls_clone.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(OracleError::Network("flaky".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retriable_errors_surface_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let config = no_jitter(5);

        let result: Result<()> = retry_async(&config, move |_| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(OracleError::Validation("bad input".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(OracleError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let config = RetryConfig {
            base_delay: Duration::from_millis(1),
            ..no_jitter(2)
        };
        let result: Result<()> = retry_async(&config, |_| async {
            Err(OracleError::Timeout("slow upstream".into()))
        })
        .await;
        assert!(matches!(result, Err(OracleError::Timeout(_))));
    }
}
