//! UMA optimistic oracle adapter.
//!
//! UMA resolves by proposal: a value is posted with a bond and becomes final
//! after the liveness window unless disputed. This adapter assembles and
//! submits the request; the wall-clock latency recorded on the response is the
//! submission round-trip, while the liveness window governs finalization and
//! is reported in the metadata.

use super::{AdapterCore, OracleAdapter};
use crate::config::ProviderSettings;
use crate::models::{DataCategory, MarketType, OracleRequest};
use crate::transport::HttpSession;
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

const DEFAULT_ENDPOINT: &str = "https://oracle.uma.xyz/api";
const DEFAULT_LIVENESS_SECS: u64 = 7200;
const DEFAULT_BOND_USDC: &str = "100";

/// Price identifier understood by the optimistic oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UmaIdentifier {
    YesOrNoQuery,
    Numerical,
    MultipleChoice,
}

impl UmaIdentifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            UmaIdentifier::YesOrNoQuery => "YES_OR_NO_QUERY",
            UmaIdentifier::Numerical => "NUMERICAL",
            UmaIdentifier::MultipleChoice => "MULTIPLE_CHOICE",
        }
    }

    pub fn for_market_type(market_type: MarketType) -> Self {
        match market_type {
            MarketType::Binary => UmaIdentifier::YesOrNoQuery,
            MarketType::Scalar => UmaIdentifier::Numerical,
            MarketType::Categorical => UmaIdentifier::MultipleChoice,
        }
    }
}

pub struct UmaAdapter {
    core: AdapterCore,
    session: Arc<HttpSession>,
    endpoint: String,
    categories: Vec<DataCategory>,
}

impl UmaAdapter {
    pub fn new(session: Arc<HttpSession>, settings: &ProviderSettings) -> Self {
        Self {
            core: AdapterCore::new("uma"),
            session,
            endpoint: settings
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            categories: vec![
                DataCategory::Custom,
                DataCategory::Events,
                DataCategory::Economic,
                DataCategory::Election,
            ],
        }
    }

    /// Assemble the optimistic-oracle payload. The question text is always
    /// '?'-terminated and the ancillary data is a JSON document describing
    /// the resolution criteria.
    pub fn build_request_payload(&self, request: &OracleRequest) -> Value {
        let question = normalize_question(&request.query);
        let identifier = request
            .parameters
            .get("market_type")
            .and_then(|v| serde_json::from_value::<MarketType>(v.clone()).ok())
            .map(UmaIdentifier::for_market_type)
            .unwrap_or(UmaIdentifier::YesOrNoQuery);
        let liveness = request
            .parameters
            .get("liveness_period")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_LIVENESS_SECS);
        let bond = request
            .parameters
            .get("bond_amount")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_BOND_USDC);

        json!({
            "identifier": identifier.as_str(),
            "question_text": question,
            "ancillary_data": json!({
                "question": question,
                "category": request.data_type.as_str(),
                "resolution_criteria": request.parameters.get("resolution_criteria")
                    .cloned()
                    .unwrap_or(json!("Resolve per verifiable public sources")),
            }).to_string(),
            "bond_amount": bond,
            "liveness_period_seconds": liveness,
        })
    }
}

fn normalize_question(query: &str) -> String {
    let trimmed = query.trim();
    if trimmed.ends_with('?') {
        trimmed.to_string()
    } else {
        format!("{trimmed}?")
    }
}

#[async_trait]
impl OracleAdapter for UmaAdapter {
    fn name(&self) -> &str {
        "uma"
    }

    fn supported_categories(&self) -> &[DataCategory] {
        &self.categories
    }

    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn fetch(&self, request: &OracleRequest) -> Result<Value> {
        let payload = self.build_request_payload(request);
        let url = format!("{}/optimistic/request", self.endpoint);
        let body = self.session.post_json(&url, &payload, None, None).await?;
        Ok(json!({
            "request_id": body["request_id"],
            "state": body["state"].as_str().unwrap_or("requested"),
            "identifier": payload["identifier"],
            "liveness_period_seconds": payload["liveness_period_seconds"],
        }))
    }

    async fn health_probe(&self) -> Result<Value> {
        let url = format!("{}/status", self.endpoint);
        self.session.get_json(&url, None, None).await
    }

    /// Proposals are human-verified; confidence only reflects whether the
    /// submission was accepted.
    fn estimate_confidence(&self, data: &Value, _request: &OracleRequest) -> f64 {
        if data.is_null() {
            0.0
        } else {
            0.97
        }
    }

    /// Includes the proposer bond.
    fn estimate_cost(&self, _request: &OracleRequest) -> f64 {
        100.0
    }

    fn response_metadata(&self, request: &OracleRequest) -> Map<String, Value> {
        let liveness = request
            .parameters
            .get("liveness_period")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_LIVENESS_SECS);
        let mut metadata = Map::new();
        metadata.insert("oracle_type".into(), json!("optimistic"));
        metadata.insert("dispute_mechanism".into(), json!(true));
        // Submission completes quickly; finalization waits out the liveness
        // window in the undisputed path.
        metadata.insert("finalization_latency_ms".into(), json!(liveness * 1000));
        metadata.insert("liveness_period_seconds".into(), json!(liveness));
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> UmaAdapter {
        let session = Arc::new(HttpSession::new(std::time::Duration::from_secs(5)).unwrap());
        UmaAdapter::new(session, &ProviderSettings::default())
    }

    #[test]
    fn question_text_is_always_terminated() {
        assert_eq!(normalize_question("Will the Fed cut rates"), "Will the Fed cut rates?");
        assert_eq!(normalize_question("Will it happen?"), "Will it happen?");
        assert_eq!(normalize_question("  padded  "), "padded?");
    }

    #[test]
    fn payload_carries_identifier_bond_and_liveness() {
        let adapter = adapter();
        let request = OracleRequest::new(
            "Will the Federal Reserve raise interest rates at the next FOMC meeting",
            DataCategory::Economic,
        )
        .with_parameter("market_type", json!("binary"));

        let payload = adapter.build_request_payload(&request);
        assert_eq!(payload["identifier"], "YES_OR_NO_QUERY");
        assert_eq!(payload["bond_amount"], "100");
        assert_eq!(payload["liveness_period_seconds"], 7200);
        assert!(payload["question_text"].as_str().unwrap().ends_with('?'));

        // Ancillary data is itself a JSON document
        let ancillary: Value =
            serde_json::from_str(payload["ancillary_data"].as_str().unwrap()).unwrap();
        assert_eq!(ancillary["category"], "economic");
    }

    #[test]
    fn identifier_follows_market_type() {
        assert_eq!(
            UmaIdentifier::for_market_type(MarketType::Scalar),
            UmaIdentifier::Numerical
        );
        assert_eq!(
            UmaIdentifier::for_market_type(MarketType::Categorical),
            UmaIdentifier::MultipleChoice
        );
    }

    #[test]
    fn metadata_reports_finalization_latency_separately() {
        let adapter = adapter();
        let request = OracleRequest::new("Will X happen?", DataCategory::Events);
        let metadata = adapter.response_metadata(&request);
        assert_eq!(metadata["finalization_latency_ms"], json!(7_200_000u64));
        assert_eq!(metadata["oracle_type"], json!("optimistic"));
    }
}
