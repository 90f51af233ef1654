// Oracle Router - Rust Edition
// An oracle routing and aggregation core for prediction-market backends

//! # Oracle Router Library
//!
//! This is the main library crate for the oracle routing core. It decides which
//! external oracle network (price feeds, optimistic human-verified oracles,
//! sports data, weather data, ...) is the best resolver for a prediction-market
//! question, configures a provider-specific query, fetches and cross-checks
//! data, and emits a structured routing/resolution record suitable for
//! on-chain prediction-market contracts.
//!
//! ## Core Components
//!
//! - [`models`]: Domain model and wire types (questions, capabilities, routing
//!   records, the canonical oracle request/response contract, and the
//!   contract-compatible structs consumed by on-chain encoders)
//! - [`transport`]: HTTP session, retry with backoff, circuit breaker,
//!   token-bucket rate limiting, and TTL caching shared by every adapter
//! - [`adapters`]: The [`adapters::OracleAdapter`] trait, the concrete
//!   Chainlink/Pyth/Band/UMA/API3 adapters, and the adapter registry
//! - [`routing`]: Question classifier and the rule-based routing engine
//! - [`ai`]: LLM provider clients with a fallback chain, the enhancement
//!   service for low-confidence routing decisions, and market resolution
//! - [`aggregator`]: Multi-provider fan-out with median/latest consensus and
//!   discrepancy detection
//! - [`service`]: The top-level [`service::OracleRoutingService`] orchestrator

pub mod models;

pub mod transport;

pub mod adapters;

pub mod routing;

pub mod ai;

pub mod aggregator;

pub mod service;

pub mod config;

// Re-export core domain types for easy access
pub use models::{
    AggregatedOracleData,
    AggregationMethod,
    Classification,
    ComparisonOp,
    DataCategory,
    MarketType,
    OracleProvider,
    OracleRequest,
    OracleResponse,
    ProviderCapabilities,
    QuestionRequirements,
    ResolutionMethod,
    ResponseFormat,
    RoutingRequest,
    RoutingResponse,
    UpdateFrequency,
};

// Re-export contract-compatible structs used by LLM outputs and on-chain encoders
pub use models::contracts::{
    ContractProvider, OracleData, OracleDataValidation, OracleRoutingResponse,
    PredictionMarketResolution, PriceData, ResolutionData, RouteResult,
};

pub use adapters::{AdapterRegistry, AdapterStats, HealthStatus, OracleAdapter};
pub use aggregator::Aggregator;
pub use config::{OracleConfig, ProviderSettings};
pub use routing::{QuestionClassifier, RoutingEngine};
pub use service::OracleRoutingService;

use serde_json::json;
use thiserror::Error;

/// Custom error types for oracle routing operations
///
/// Provider-level failures never surface through this enum on the query path:
/// adapters translate them into a non-throwing [`models::OracleResponse`] with
/// the `error` field set. This enum covers programmer errors (validation,
/// configuration, authentication) plus the transport-level failures that the
/// retry layer classifies before deciding whether to retry.
#[derive(Error, Debug)]
pub enum OracleError {
    /// Bad input from the caller; never retried
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing or invalid configuration; fatal at startup
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Bad credentials; never retried
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Upstream asked us to back off; retriable once `retry_after` has passed
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },

    /// Request exceeded its deadline; retriable
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Connection-level failure; retriable
    #[error("Network error: {0}")]
    Network(String),

    /// Oracle provider failure; retriable iff the status is a server error
    #[error("Provider {provider} error: {message}")]
    Provider {
        provider: String,
        message: String,
        status: Option<u16>,
    },

    /// No oracle satisfies the routing constraints. The routing engine itself
    /// reports this as `can_resolve = false`; the error form exists for callers
    /// that require a selection.
    #[error("Routing error: {0}")]
    Routing(String),

    /// Aggregated values disagree beyond acceptable bounds
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// Cache backend failure
    #[error("Cache error: {0}")]
    Cache(String),

    /// LLM unavailable or returned invalid output; callers fall back to the
    /// rule-based response
    #[error("AI service error: {0}")]
    AiService(String),

    /// Adapter cannot handle the requested category; permanent
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The caller's context was cancelled mid-flight
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    /// Using anyhow::Error for flexible wrapping of unexpected failures
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OracleError {
    /// Machine-readable error kind carried on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            OracleError::Validation(_) => "VALIDATION",
            OracleError::Configuration(_) => "CONFIG",
            OracleError::Authentication(_) => "AUTH",
            OracleError::RateLimited { .. } => "RATE_LIMIT",
            OracleError::Timeout(_) => "TIMEOUT",
            OracleError::Network(_) => "NETWORK",
            OracleError::Provider { .. } => "PROVIDER",
            OracleError::Routing(_) => "ROUTING",
            OracleError::DataIntegrity(_) => "DATA_INTEGRITY",
            OracleError::Cache(_) => "CACHE",
            OracleError::AiService(_) => "AI_SERVICE",
            OracleError::Unsupported(_) => "UNSUPPORTED",
            OracleError::Cancelled(_) => "CANCELLED",
            OracleError::Serialization(_) => "VALIDATION",
            OracleError::Internal(_) => "UNKNOWN",
        }
    }

    /// Whether the transport layer may retry the failed call.
    ///
    /// `5xx`, timeouts, connection failures, and 429s are retriable; every
    /// other kind surfaces immediately.
    pub fn is_retriable(&self) -> bool {
        match self {
            OracleError::RateLimited { .. } | OracleError::Timeout(_) | OracleError::Network(_) => {
                true
            }
            OracleError::Provider { status, .. } => matches!(status, Some(s) if *s >= 500),
            _ => false,
        }
    }

    /// Human-friendly message mapped from the error kind.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            "VALIDATION" => "The request was invalid. Please check your input and try again.",
            "CONFIG" => "The service is misconfigured. Please contact the operator.",
            "AUTH" => "Authentication failed. Please check your API credentials.",
            "RATE_LIMIT" => "Too many requests. Please slow down and retry shortly.",
            "TIMEOUT" => "The oracle took too long to respond. Please try again.",
            "NETWORK" => "A network error occurred while reaching the oracle.",
            "PROVIDER" => "The oracle provider reported an error. Please try again later.",
            "ROUTING" => "No oracle can resolve this question with the given constraints.",
            "DATA_INTEGRITY" => "Oracle providers disagree on this data beyond safe bounds.",
            "CACHE" => "A caching error occurred. The request may still succeed on retry.",
            "AI_SERVICE" => "The AI enhancement service is unavailable.",
            "UNSUPPORTED" => "This operation is not supported by the selected oracle.",
            "CANCELLED" => "The request was cancelled.",
            _ => "An unexpected error occurred.",
        }
    }

    /// Wire-level error body: `{"error": {"kind", "message", "details"}}`.
    pub fn to_wire(&self) -> serde_json::Value {
        let details = match self {
            OracleError::RateLimited {
                retry_after_secs, ..
            } => json!({ "retry_after_secs": retry_after_secs }),
            OracleError::Provider {
                provider, status, ..
            } => json!({ "provider": provider, "status": status }),
            _ => json!({}),
        };
        json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
                "details": details,
                "user_message": self.user_message(),
            }
        })
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OracleError::Timeout(err.to_string())
        } else if err.is_connect() {
            OracleError::Network(format!("connection failed: {err}"))
        } else {
            OracleError::Network(err.to_string())
        }
    }
}

impl From<std::io::Error> for OracleError {
    fn from(err: std::io::Error) -> Self {
        OracleError::Cache(err.to_string())
    }
}

/// Type alias for Results that use the crate error type
pub type Result<T> = std::result::Result<T, OracleError>;
