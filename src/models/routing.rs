//! Routing request/response records: the public contract of the routing core.

use super::capabilities::{OracleProvider, ResolutionMethod, UpdateFrequency};
use super::question::DataCategory;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A question plus the caller's hard constraints. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoutingRequest {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_hint: Option<DataCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_chains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_providers: Option<Vec<OracleProvider>>,
}

impl RoutingRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_hint(mut self, hint: DataCategory) -> Self {
        self.category_hint = Some(hint);
        self
    }
}

/// The routing core's answer: whether the question is resolvable, by whom,
/// and with what provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingResponse {
    pub can_resolve: bool,
    pub selected_oracle: Option<OracleProvider>,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oracle_config: Option<Value>,
    #[serde(default)]
    pub alternatives: Vec<OracleProvider>,
    pub data_type: Option<DataCategory>,
    #[serde(default)]
    pub required_feeds: Vec<String>,
    pub estimated_cost_usd: Option<f64>,
    pub estimated_latency_ms: Option<u64>,
    /// Always in `[0, 1]`
    pub confidence_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_method: Option<ResolutionMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_frequency: Option<UpdateFrequency>,
}

impl RoutingResponse {
    /// The "no candidate" outcome. Routing failures are values, never errors.
    pub fn unresolvable(reasoning: impl Into<String>, confidence: f64) -> Self {
        Self {
            can_resolve: false,
            selected_oracle: None,
            reasoning: reasoning.into(),
            oracle_config: None,
            alternatives: Vec::new(),
            data_type: None,
            required_feeds: Vec::new(),
            estimated_cost_usd: None,
            estimated_latency_ms: None,
            confidence_score: confidence.clamp(0.0, 1.0),
            resolution_method: None,
            update_frequency: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolvable_response_shape() {
        let response = RoutingResponse::unresolvable("no oracle supports nft data", 0.4);
        assert!(!response.can_resolve);
        assert!(response.selected_oracle.is_none());
        assert_eq!(response.confidence_score, 0.4);

        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["can_resolve"], false);
        assert_eq!(wire["selected_oracle"], Value::Null);
        assert_eq!(wire["alternatives"], serde_json::json!([]));
    }

    #[test]
    fn wire_field_names_match_contract() {
        let response = RoutingResponse {
            can_resolve: true,
            selected_oracle: Some(OracleProvider::Pyth),
            reasoning: "fast feeds".into(),
            oracle_config: None,
            alternatives: vec![OracleProvider::Chainlink],
            data_type: Some(DataCategory::Price),
            required_feeds: vec!["BTC".into()],
            estimated_cost_usd: Some(0.10),
            estimated_latency_ms: Some(100),
            confidence_score: 0.9,
            resolution_method: Some(ResolutionMethod::DirectPull),
            update_frequency: Some(UpdateFrequency::Realtime),
        };
        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["selected_oracle"], "pyth");
        assert_eq!(wire["data_type"], "price");
        assert_eq!(wire["confidence_score"], 0.9);
        assert_eq!(wire["resolution_method"], "direct_pull");
        assert_eq!(wire["update_frequency"], "realtime");
    }
}
