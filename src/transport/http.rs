//! Long-lived, connection-pooled HTTP session.
//!
//! Every outbound call acquires a per-host rate-limit token, runs under the
//! shared retry policy, and emits a [`RequestMetric`].

use super::rate_limit::HostRateLimiters;
use super::retry::{retry_async, RetryConfig};
use crate::{OracleError, Result};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Observability record for one logical request (including its retries).
#[derive(Debug, Clone)]
pub struct RequestMetric {
    pub id: Uuid,
    pub method: String,
    pub url: String,
    pub status: Option<u16>,
    pub duration_ms: u64,
    pub bytes: u64,
    pub retries: u32,
    pub error: Option<String>,
}

/// Shared HTTP session: pooled client + per-host rate limiting + retry.
pub struct HttpSession {
    client: Client,
    limiters: HostRateLimiters,
    retry: RetryConfig,
}

impl HttpSession {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| OracleError::Configuration(format!("http client build failed: {e}")))?;
        Ok(Self {
            client,
            limiters: HostRateLimiters::default(),
            retry: RetryConfig::network(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// GET a JSON document.
    pub async fn get_json(
        &self,
        url: &str,
        headers: Option<HeaderMap>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value> {
        self.execute_json(Method::GET, url, None, headers, cancel)
            .await
    }

    /// POST a JSON body and parse a JSON response.
    pub async fn post_json(
        &self,
        url: &str,
        body: &Value,
        headers: Option<HeaderMap>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value> {
        self.execute_json(Method::POST, url, Some(body.clone()), headers, cancel)
            .await
    }

    /// Cheap reachability probe: HEAD-like GET that only checks the status.
    pub async fn probe(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) => !response.status().is_server_error(),
            Err(_) => false,
        }
    }

    async fn execute_json(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
        headers: Option<HeaderMap>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value> {
        let limiter = self.limiters.for_url(url);
        let metric_id = Uuid::new_v4();
        let start = Instant::now();
        let mut retries = 0u32;

        let result = retry_async(&self.retry, |attempt| {
            retries = attempt - 1;
            let method = method.clone();
            let headers = headers.clone();
            let body = body.clone();
            let limiter = limiter.clone();
            async move {
                limiter.acquire(1, cancel).await?;

                let mut request = self.client.request(method, url);
                if let Some(headers) = headers {
                    request = request.headers(headers);
                }
                if let Some(body) = &body {
                    request = request.json(body);
                }

                let send = request.send();
                let response = match cancel {
                    Some(token) => tokio::select! {
                        _ = token.cancelled() => {
                            return Err(OracleError::Cancelled("request cancelled".into()))
                        }
                        result = send => result?,
                    },
                    None => send.await?,
                };

                let response = self.check_status(response, &limiter).await?;
                let value = response.json::<Value>().await.map_err(|e| {
                    OracleError::Provider {
                        provider: "upstream".into(),
                        message: format!("invalid JSON body: {e}"),
                        status: None,
                    }
                })?;
                Ok(value)
            }
        })
        .await;

        let metric = RequestMetric {
            id: metric_id,
            method: method.to_string(),
            url: url.to_string(),
            status: None,
            duration_ms: start.elapsed().as_millis() as u64,
            bytes: 0,
            retries,
            error: result.as_ref().err().map(|e| e.to_string()),
        };
        debug!(
            id = %metric.id,
            method = %metric.method,
            url = %metric.url,
            duration_ms = metric.duration_ms,
            retries = metric.retries,
            error = ?metric.error,
            "http request completed"
        );

        result
    }

    /// Map an HTTP status to the error taxonomy. 429 records the upstream
    /// `Retry-After` on the host's limiter so subsequent calls fail fast.
    async fn check_status(
        &self,
        response: Response,
        limiter: &super::rate_limit::RateLimiter,
    ) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status.to_string()
        } else {
            format!("{status}: {body}")
        };

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(OracleError::Authentication(message))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let secs = retry_after.unwrap_or(1);
                limiter.note_retry_after(Duration::from_secs(secs)).await;
                Err(OracleError::RateLimited {
                    message,
                    retry_after_secs: Some(secs),
                })
            }
            s => Err(OracleError::Provider {
                provider: "upstream".into(),
                message,
                status: Some(s.as_u16()),
            }),
        }
    }
}
