//! Per-adapter circuit breaker.
//!
//! State machine: `closed -> open -> half-open -> closed`. In `closed`,
//! failures increment a counter; reaching the threshold opens the circuit. In
//! `open`, every call fails fast until the recovery timeout elapses, then a
//! single probe is allowed (`half-open`); probe success closes the circuit,
//! probe failure reopens it.

use crate::{OracleError, Result};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Circuit breaker guarding one upstream. Transitions are atomic under the
/// internal lock.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: &str, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            failure_threshold,
            recovery_timeout,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
            }),
        }
    }

    /// Default thresholds: 5 consecutive failures, 60 second recovery.
    pub fn with_defaults(name: &str) -> Self {
        Self::new(name, 5, Duration::from_secs(60))
    }

    /// Gate a call. `Ok(())` means the call may proceed (closed, or half-open
    /// probe); `Err` means fail fast without touching the upstream.
    pub fn check(&self) -> Result<()> {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_time
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.recovery_timeout {
                    info!(breaker = %self.name, "recovery timeout elapsed, allowing probe");
                    inner.state = CircuitState::HalfOpen;
                    Ok(())
                } else {
                    Err(OracleError::Provider {
                        provider: self.name.clone(),
                        message: format!(
                            "circuit open, retry in {:?}",
                            self.recovery_timeout - elapsed
                        ),
                        status: None,
                    })
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        if inner.state != CircuitState::Closed {
            info!(breaker = %self.name, "circuit closed after successful probe");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure_time = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.failure_count += 1;
        inner.last_failure_time = Some(Instant::now());
        match inner.state {
            CircuitState::HalfOpen => {
                warn!(breaker = %self.name, "probe failed, circuit reopened");
                inner.state = CircuitState::Open;
            }
            CircuitState::Closed if inner.failure_count >= self.failure_threshold => {
                warn!(
                    breaker = %self.name,
                    failures = inner.failure_count,
                    "failure threshold reached, circuit opened"
                );
                inner.state = CircuitState::Open;
            }
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner
            .lock()
            .expect("breaker lock poisoned")
            .failure_count
    }
}
