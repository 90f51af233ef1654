//! Aggregation records: consensus across multiple providers for one request.

use super::capabilities::OracleProvider;
use super::question::DataCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Consensus strategy applied by the aggregator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    /// Numeric median across providers (mean of middle two on even counts)
    Median,
    /// Most recent value by provider timestamp, for non-numeric data
    Latest,
}

/// One provider's contribution to an aggregation round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleDataPoint {
    pub provider: OracleProvider,
    pub data_type: DataCategory,
    pub value: Value,
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
}

/// Cross-checked result across two or more providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedOracleData {
    pub data_type: DataCategory,
    pub providers: Vec<OracleProvider>,
    pub aggregation_method: AggregationMethod,
    pub aggregated_value: Value,
    /// Provider id -> the value that provider reported
    pub individual_values: HashMap<String, Value>,
    /// Maximum input timestamp
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
    /// True when numeric spread `(max - min) / max` exceeds 5%
    pub discrepancy_detected: bool,
}
