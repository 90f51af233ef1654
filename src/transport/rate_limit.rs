//! Token-bucket rate limiting, one bucket per remote host.

use crate::{OracleError, Result};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    /// Set after a 429 with `Retry-After`; acquires fail fast until it passes
    reset_deadline: Option<Instant>,
}

/// Token bucket: `max_tokens` capacity, refilled at `refill_rate` tokens per
/// second. `acquire` suspends cooperatively; it never blocks the executor.
#[derive(Debug)]
pub struct RateLimiter {
    max_tokens: f64,
    refill_rate: f64,
    inner: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(max_tokens: u32, refill_rate: f64) -> Self {
        Self {
            max_tokens: max_tokens as f64,
            refill_rate,
            inner: Mutex::new(Bucket {
                tokens: max_tokens as f64,
                last_refill: Instant::now(),
                reset_deadline: None,
            }),
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let elapsed = bucket.last_refill.elapsed().as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        bucket.last_refill = Instant::now();
    }

    /// Take `n` tokens if immediately available.
    pub async fn try_acquire(&self, n: u32) -> Result<bool> {
        let mut bucket = self.inner.lock().await;
        self.check_reset_deadline(&bucket)?;
        self.refill(&mut bucket);
        if bucket.tokens >= n as f64 {
            bucket.tokens -= n as f64;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Wait until `n` tokens are available, or the caller's context is
    /// cancelled. A pending rate-limit reset deadline fails fast instead of
    /// waiting.
    pub async fn acquire(&self, n: u32, cancel: Option<&CancellationToken>) -> Result<()> {
        loop {
            let wait = {
                let mut bucket = self.inner.lock().await;
                self.check_reset_deadline(&bucket)?;
                self.refill(&mut bucket);
                if bucket.tokens >= n as f64 {
                    bucket.tokens -= n as f64;
                    return Ok(());
                }
                let shortfall = n as f64 - bucket.tokens;
                Duration::from_secs_f64((shortfall / self.refill_rate).min(1.0))
            };

            debug!(wait_ms = wait.as_millis() as u64, "rate limiter waiting for tokens");
            match cancel {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => {
                        return Err(OracleError::Cancelled(
                            "cancelled while waiting for rate limit tokens".into(),
                        ))
                    }
                    _ = tokio::time::sleep(wait) => {}
                },
                None => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Honor an upstream `Retry-After`: reject local calls until the deadline.
    pub async fn note_retry_after(&self, retry_after: Duration) {
        let mut bucket = self.inner.lock().await;
        let deadline = Instant::now() + retry_after;
        warn!(
            retry_after_secs = retry_after.as_secs(),
            "upstream rate limit hit, rejecting locally until deadline"
        );
        bucket.reset_deadline = Some(deadline);
    }

    fn check_reset_deadline(&self, bucket: &Bucket) -> Result<()> {
        if let Some(deadline) = bucket.reset_deadline {
            let now = Instant::now();
            if now < deadline {
                return Err(OracleError::RateLimited {
                    message: "upstream rate limit reset pending".into(),
                    retry_after_secs: Some((deadline - now).as_secs().max(1)),
                });
            }
        }
        Ok(())
    }

    /// Current token count after refill accounting.
    pub async fn tokens(&self) -> f64 {
        let mut bucket = self.inner.lock().await;
        self.refill(&mut bucket);
        bucket.tokens
    }
}

/// One [`RateLimiter`] per remote host, created on first use.
pub struct HostRateLimiters {
    limiters: DashMap<String, Arc<RateLimiter>>,
    max_tokens: u32,
    refill_rate: f64,
}

impl HostRateLimiters {
    pub fn new(max_tokens: u32, refill_rate: f64) -> Self {
        Self {
            limiters: DashMap::new(),
            max_tokens,
            refill_rate,
        }
    }

    /// The bucket for `url`'s host (the whole URL string when unparsable).
    pub fn for_url(&self, url: &str) -> Arc<RateLimiter> {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| url.to_string());
        self.limiters
            .entry(host)
            .or_insert_with(|| Arc::new(RateLimiter::new(self.max_tokens, self.refill_rate)))
            .clone()
    }
}

impl Default for HostRateLimiters {
    fn default() -> Self {
        // 20 requests burst, 10/s sustained per host
        Self::new(20, 10.0)
    }
}
