//! Provider adapter interface.
//!
//! Every oracle backend sits behind [`OracleAdapter`], which normalizes
//! heterogeneous providers into the canonical request/response contract. The
//! provided `query` method owns the template: validate, circuit-breaker gate,
//! timeout-bounded fetch, latency capture, stats update, and translation of
//! provider failures into non-throwing error responses.

pub mod api3;
pub mod band;
pub mod chainlink;
pub mod pyth;
pub mod registry;
pub mod uma;

#[cfg(test)]
pub mod testing;


pub use api3::Api3Adapter;
pub use band::BandAdapter;
pub use chainlink::ChainlinkAdapter;
pub use pyth::PythAdapter;
pub use registry::AdapterRegistry;
pub use uma::UmaAdapter;

use crate::models::{DataCategory, OracleRequest, OracleResponse};
use crate::transport::CircuitBreaker;
use crate::{OracleError, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Running counters for one adapter. Mutated only by the owning adapter's
/// query path, under the adapter-local lock; readers take a snapshot.
#[derive(Debug, Default, Clone)]
pub struct AdapterStats {
    pub requests: u64,
    pub errors: u64,
    pub total_latency_ms: u64,
    pub last_error: Option<String>,
}

impl AdapterStats {
    /// Fraction of successful requests, in `[0, 1]`. 1 when no requests yet.
    pub fn success_rate(&self) -> f64 {
        if self.requests == 0 {
            return 1.0;
        }
        1.0 - (self.errors as f64 / self.requests as f64)
    }

    pub fn avg_latency_ms(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }
        self.total_latency_ms as f64 / self.requests as f64
    }
}

/// Read-only view of an adapter's counters at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterStatsSnapshot {
    pub name: String,
    pub version: String,
    pub requests: u64,
    pub errors: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub last_error: Option<String>,
}

/// On-demand health report; not persisted.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub response_time_ms: u64,
    /// Accumulated error percentage over the adapter's lifetime, `[0, 100]`
    pub error_rate: f64,
    pub last_error: Option<String>,
    pub uptime_pct: f64,
}

/// Stats and breaker shared by every adapter implementation.
#[derive(Debug)]
pub struct AdapterCore {
    stats: Mutex<AdapterStats>,
    breaker: CircuitBreaker,
}

impl AdapterCore {
    pub fn new(name: &str) -> Self {
        Self {
            stats: Mutex::new(AdapterStats::default()),
            breaker: CircuitBreaker::with_defaults(name),
        }
    }
}

/// Uniform contract every oracle backend implements.
#[async_trait]
pub trait OracleAdapter: Send + Sync {
    /// Stable adapter id (`chainlink`, `pyth`, ...), also the registry key.
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn supported_categories(&self) -> &[DataCategory];

    /// Shared stats/breaker state. Implementations embed an [`AdapterCore`].
    fn core(&self) -> &AdapterCore;

    /// Execute the provider wire call and return the raw data document.
    /// Transport-level policy (retry, rate limiting) is applied inside the
    /// shared HTTP session; this method only translates the canonical request
    /// into the provider's protocol.
    async fn fetch(&self, request: &OracleRequest) -> Result<Value>;

    /// Cheap reachability probe against a well-known feed.
    async fn health_probe(&self) -> Result<Value>;

    /// Provider-specific confidence in `[0, 1]` for a successful response.
    fn estimate_confidence(&self, data: &Value, request: &OracleRequest) -> f64 {
        let _ = request;
        if data.is_null() {
            0.0
        } else {
            1.0
        }
    }

    /// Estimated cost in USD for serving this request.
    fn estimate_cost(&self, request: &OracleRequest) -> f64 {
        let _ = request;
        0.0
    }

    fn response_metadata(&self, request: &OracleRequest) -> Map<String, Value> {
        let _ = request;
        Map::new()
    }

    /// Reject requests the adapter cannot serve. Validation failures surface
    /// as errors, unlike provider failures which become error responses.
    fn validate_request(&self, request: &OracleRequest) -> Result<()> {
        if request.query.trim().is_empty() {
            return Err(OracleError::Validation("query cannot be empty".into()));
        }
        if !self.supported_categories().contains(&request.data_type) {
            return Err(OracleError::Unsupported(format!(
                "{} does not support {} data",
                self.name(),
                request.data_type
            )));
        }
        Ok(())
    }

    /// Execute a query with the full adapter template. Provider-level
    /// failures are returned as responses with `error` set and
    /// `confidence = 0`; only validation problems raise.
    async fn query(&self, request: &OracleRequest) -> Result<OracleResponse> {
        self.validate_request(request)?;

        {
            let mut stats = self.core().stats.lock().expect("stats lock poisoned");
            stats.requests += 1;
        }
        let start = Instant::now();

        if let Err(err) = self.core().breaker.check() {
            return Ok(self.failure_response(err, start, false));
        }

        let timeout = Duration::from_millis(request.timeout_ms);
        let outcome = tokio::time::timeout(timeout, self.fetch(request)).await;
        match outcome {
            Err(_) => {
                let err = OracleError::Timeout(format!(
                    "{} query exceeded {}ms",
                    self.name(),
                    request.timeout_ms
                ));
                Ok(self.failure_response(err, start, true))
            }
            Ok(Err(err)) => Ok(self.failure_response(err, start, true)),
            Ok(Ok(data)) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                self.core().breaker.record_success();
                {
                    let mut stats = self.core().stats.lock().expect("stats lock poisoned");
                    stats.total_latency_ms += latency_ms;
                }
                let confidence = self.estimate_confidence(&data, request);
                debug!(
                    adapter = self.name(),
                    latency_ms, confidence, "oracle query succeeded"
                );
                Ok(OracleResponse::success(
                    self.name(),
                    data,
                    confidence,
                    latency_ms,
                    self.estimate_cost(request),
                    self.response_metadata(request),
                ))
            }
        }
    }

    /// Like [`OracleAdapter::query`] but abandons the request when `cancel`
    /// fires, recording a cancelled error against the stats.
    async fn query_cancellable(
        &self,
        request: &OracleRequest,
        cancel: &CancellationToken,
    ) -> Result<OracleResponse> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let err = OracleError::Cancelled(format!("{} query cancelled", self.name()));
                {
                    let mut stats = self.core().stats.lock().expect("stats lock poisoned");
                    stats.errors += 1;
                    stats.last_error = Some(err.to_string());
                }
                Ok(OracleResponse::failure(
                    self.name(),
                    format!("{}: {err}", err.kind()),
                    0,
                ))
            }
            result = self.query(request) => result,
        }
    }

    /// Probe the provider and combine observed latency with accumulated
    /// error rate.
    async fn health_check(&self) -> HealthStatus {
        let start = Instant::now();
        let probe = tokio::time::timeout(Duration::from_secs(10), self.health_probe()).await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        let stats = self.stats_snapshot();
        let error_rate = (1.0 - stats.success_rate) * 100.0;
        match probe {
            Ok(Ok(_)) => HealthStatus {
                is_healthy: true,
                response_time_ms,
                error_rate,
                last_error: stats.last_error,
                uptime_pct: stats.success_rate * 100.0,
            },
            Ok(Err(err)) => HealthStatus {
                is_healthy: false,
                response_time_ms,
                error_rate,
                last_error: Some(err.to_string()),
                uptime_pct: stats.success_rate * 100.0,
            },
            Err(_) => HealthStatus {
                is_healthy: false,
                response_time_ms,
                error_rate,
                last_error: Some("health probe timed out".into()),
                uptime_pct: stats.success_rate * 100.0,
            },
        }
    }

    fn stats_snapshot(&self) -> AdapterStatsSnapshot {
        let stats = self.core().stats.lock().expect("stats lock poisoned");
        AdapterStatsSnapshot {
            name: self.name().to_string(),
            version: self.version().to_string(),
            requests: stats.requests,
            errors: stats.errors,
            success_rate: stats.success_rate(),
            avg_latency_ms: stats.avg_latency_ms(),
            last_error: stats.last_error.clone(),
        }
    }

    fn reset_stats(&self) {
        let mut stats = self.core().stats.lock().expect("stats lock poisoned");
        *stats = AdapterStats::default();
    }

    /// Record a provider-level failure and translate it into a non-throwing
    /// response. `breaker_failure` is false for fail-fast rejections that the
    /// breaker itself produced.
    fn failure_response(
        &self,
        err: OracleError,
        start: Instant,
        breaker_failure: bool,
    ) -> OracleResponse {
        let latency_ms = start.elapsed().as_millis() as u64;
        if breaker_failure {
            self.core().breaker.record_failure();
        }
        {
            let mut stats = self.core().stats.lock().expect("stats lock poisoned");
            stats.errors += 1;
            stats.total_latency_ms += latency_ms;
            stats.last_error = Some(err.to_string());
        }
        error!(adapter = self.name(), error = %err, "oracle query failed");
        OracleResponse::failure(self.name(), format!("{}: {err}", err.kind()), latency_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FlakyAdapter {
        core: AdapterCore,
        categories: Vec<DataCategory>,
        fail: std::sync::atomic::AtomicBool,
    }

    impl FlakyAdapter {
        fn new() -> Self {
            Self {
                core: AdapterCore::new("flaky"),
                categories: vec![DataCategory::Price],
                fail: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl OracleAdapter for FlakyAdapter {
        fn name(&self) -> &str {
            "flaky"
        }

        fn supported_categories(&self) -> &[DataCategory] {
            &self.categories
        }

        fn core(&self) -> &AdapterCore {
            &self.core
        }

        async fn fetch(&self, _request: &OracleRequest) -> Result<Value> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                Err(OracleError::Provider {
                    provider: "flaky".into(),
                    message: "upstream down".into(),
                    status: Some(500),
                })
            } else {
                Ok(json!({"price": 42.0}))
            }
        }

        async fn health_probe(&self) -> Result<Value> {
            self.fetch(&OracleRequest::new("probe", DataCategory::Price))
                .await
        }

        fn estimate_cost(&self, _request: &OracleRequest) -> f64 {
            0.01
        }
    }

    #[tokio::test]
    async fn query_validates_before_touching_stats() {
        let adapter = FlakyAdapter::new();
        let empty = OracleRequest::new("   ", DataCategory::Price);
        assert!(matches!(
            adapter.query(&empty).await,
            Err(OracleError::Validation(_))
        ));

        let wrong_type = OracleRequest::new("q", DataCategory::Weather);
        assert!(matches!(
            adapter.query(&wrong_type).await,
            Err(OracleError::Unsupported(_))
        ));
        assert_eq!(adapter.stats_snapshot().requests, 0);
    }

    #[tokio::test]
    async fn provider_failures_become_error_responses() {
        let adapter = FlakyAdapter::new();
        adapter.fail.store(true, std::sync::atomic::Ordering::SeqCst);

        let request = OracleRequest::new("BTC/USD", DataCategory::Price);
        let response = adapter.query(&request).await.unwrap();
        assert!(!response.is_success());
        assert_eq!(response.confidence, 0.0);
        assert!(response.error.as_deref().unwrap().starts_with("PROVIDER"));

        let stats = adapter.stats_snapshot();
        assert_eq!(stats.requests, 1);
        assert_eq!(stats.errors, 1);
    }

    #[tokio::test]
    async fn success_updates_stats_and_confidence() {
        let adapter = FlakyAdapter::new();
        let request = OracleRequest::new("BTC/USD", DataCategory::Price);
        let response = adapter.query(&request).await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.confidence, 1.0);
        assert_eq!(response.cost_usd, 0.01);

        let stats = adapter.stats_snapshot();
        assert_eq!(stats.requests, 1);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.success_rate, 1.0);
    }

    #[tokio::test]
    async fn breaker_sheds_load_after_repeated_failures() {
        let adapter = FlakyAdapter::new();
        adapter.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        let request = OracleRequest::new("BTC/USD", DataCategory::Price);

        for _ in 0..5 {
            adapter.query(&request).await.unwrap();
        }
        // Circuit is open now; upstream no longer touched, still non-throwing
        adapter.fail.store(false, std::sync::atomic::Ordering::SeqCst);
        let response = adapter.query(&request).await.unwrap();
        assert!(!response.is_success());
        assert!(response.error.as_deref().unwrap().contains("circuit open"));
    }

    #[tokio::test]
    async fn cancellation_marks_request_errored() {
        let adapter = FlakyAdapter::new();
        let request = OracleRequest::new("BTC/USD", DataCategory::Price);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let response = adapter.query_cancellable(&request, &cancel).await.unwrap();
        assert!(!response.is_success());
        assert!(response.error.as_deref().unwrap().starts_with("CANCELLED"));
        assert_eq!(adapter.stats_snapshot().errors, 1);
    }
}
