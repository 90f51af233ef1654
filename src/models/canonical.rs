//! The canonical oracle request/response contract.
//!
//! Every adapter consumes [`OracleRequest`] and produces [`OracleResponse`];
//! the JSON shapes are stable and shared with non-Rust consumers.

use super::question::DataCategory;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Payload encoding requested from the provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Json,
    Xml,
    Text,
    Binary,
}

/// Uniform request accepted by every oracle adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OracleRequest {
    pub query: String,
    pub data_type: DataCategory,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub format: ResponseFormat,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl OracleRequest {
    pub fn new(query: impl Into<String>, data_type: DataCategory) -> Self {
        Self {
            query: query.into(),
            data_type,
            parameters: Map::new(),
            timeout_ms: default_timeout_ms(),
            format: ResponseFormat::Json,
        }
    }

    pub fn with_parameter(mut self, key: &str, value: Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Canonical JSON rendering with stable key ordering.
    ///
    /// Round-trips byte-identically: parsing the output and re-serializing it
    /// yields the same string.
    pub fn canonical_json(&self) -> Result<String> {
        // serde_json object maps are ordered by key, so rendering through
        // Value gives a deterministic field order.
        let value = serde_json::to_value(self)?;
        Ok(serde_json::to_string(&value)?)
    }

    /// Cache key derived from the canonical JSON of the request.
    pub fn cache_key(&self) -> Result<String> {
        let canonical = self.canonical_json()?;
        let digest = Sha256::digest(canonical.as_bytes());
        Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
    }
}

/// Uniform response produced by every oracle adapter.
///
/// Provider-level failures are carried in `error` with `data = null` and
/// `confidence = 0`; the query path never raises for them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OracleResponse {
    pub data: Option<Value>,
    pub provider: String,
    pub timestamp_unix_ms: i64,
    pub confidence: f64,
    pub latency_ms: u64,
    pub cost_usd: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl OracleResponse {
    pub fn success(
        provider: &str,
        data: Value,
        confidence: f64,
        latency_ms: u64,
        cost_usd: f64,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            data: Some(data),
            provider: provider.to_string(),
            timestamp_unix_ms: chrono::Utc::now().timestamp_millis(),
            confidence: confidence.clamp(0.0, 1.0),
            latency_ms,
            cost_usd,
            metadata,
            error: None,
        }
    }

    pub fn failure(provider: &str, error: String, latency_ms: u64) -> Self {
        Self {
            data: None,
            provider: provider.to_string(),
            timestamp_unix_ms: chrono::Utc::now().timestamp_millis(),
            confidence: 0.0,
            latency_ms,
            cost_usd: 0.0,
            metadata: Map::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
