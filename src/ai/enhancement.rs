//! LLM-assisted routing enhancement.
//!
//! Low-confidence or complex routing decisions are offered to an LLM, whose
//! answer only counts after validating against the contract
//! `OracleRoutingResponse` shape. Validation failure is a recoverable
//! condition: the rule-based response stands.

use super::providers::LlmRouter;
use super::{ChatMessage, LlmRequest};
use crate::models::contracts::{routing_response_schema, OracleRoutingResponse};
use crate::models::{DataCategory, OracleProvider, RoutingRequest, RoutingResponse};
use crate::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

const COMPLEXITY_MARKERS: [&str; 6] = [" and ", " or ", " but ", "unless", "multiple", "conditional"];

pub struct EnhancementService {
    llm: Arc<LlmRouter>,
    model: String,
}

impl EnhancementService {
    pub fn new(llm: Arc<LlmRouter>, model: &str) -> Self {
        Self {
            llm,
            model: model.to_string(),
        }
    }

    /// Gate: enhance when the rule-based confidence is low, the question
    /// carries conjunction/complexity markers, the category is ambiguous, or
    /// the decision is expensive.
    pub fn should_enhance(&self, request: &RoutingRequest, basic: &RoutingResponse) -> bool {
        if basic.confidence_score < 0.7 {
            return true;
        }
        let question = request.question.to_lowercase();
        if COMPLEXITY_MARKERS.iter().any(|m| question.contains(m)) {
            return true;
        }
        if matches!(
            basic.data_type,
            Some(DataCategory::Custom) | Some(DataCategory::Events)
        ) {
            return true;
        }
        if matches!(basic.estimated_cost_usd, Some(cost) if cost > 50.0) {
            return true;
        }
        false
    }

    /// Run the enhancement path; any failure logs and returns the rule-based
    /// response unchanged.
    pub async fn enhance(
        &self,
        request: &RoutingRequest,
        basic: RoutingResponse,
        candidates: &[OracleProvider],
    ) -> RoutingResponse {
        if self.llm.is_empty() {
            return basic;
        }
        match self.try_enhance(request, &basic, candidates).await {
            Ok(enhanced) => enhanced,
            Err(err) => {
                warn!(error = %err, "AI enhancement failed, keeping rule-based response");
                basic
            }
        }
    }

    async fn try_enhance(
        &self,
        request: &RoutingRequest,
        basic: &RoutingResponse,
        candidates: &[OracleProvider],
    ) -> Result<RoutingResponse> {
        let llm_request = LlmRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(system_prompt()),
                ChatMessage::user(user_prompt(request, basic)),
            ],
            temperature: 0.2,
            max_tokens: 800,
            json_response: true,
        };

        let completion = self.llm.complete(&llm_request).await?;
        // Two-phase: syntactic parse, then contract-schema validation
        let raw: Value = serde_json::from_str(&completion.content).map_err(|e| {
            crate::OracleError::AiService(format!("model returned invalid JSON: {e}"))
        })?;
        let enhancement = OracleRoutingResponse::from_llm_json(&raw)?;

        info!(
            provider = %completion.provider,
            selected = %enhancement.selected_oracle,
            "applying AI enhancement"
        );
        Ok(apply_enhancement(basic, &enhancement, candidates))
    }
}

/// Merge the validated LLM recommendation into the rule-based response.
///
/// The LLM's selection only wins when it names a provider from the candidate
/// set; confidence rises by the (clamped) boost; the reasoning records both
/// sides; alternatives and cost/latency estimates stay untouched.
pub fn apply_enhancement(
    basic: &RoutingResponse,
    enhancement: &OracleRoutingResponse,
    candidates: &[OracleProvider],
) -> RoutingResponse {
    let mut merged = basic.clone();

    if let Some(provider) = enhancement.selected_oracle.to_oracle_provider() {
        if candidates.contains(&provider) {
            merged.selected_oracle = Some(provider);
        }
    }

    let boost = enhancement.confidence_boost.unwrap_or(0.0).clamp(0.0, 0.5);
    merged.confidence_score = (basic.confidence_score + boost).min(1.0);
    merged.reasoning = format!(
        "{} (enhanced from: {})",
        enhancement.reasoning, basic.reasoning
    );
    merged
}

fn system_prompt() -> String {
    "You are an expert in blockchain oracles and prediction markets.\n\
     \n\
     Your role is to analyze prediction market questions and recommend the optimal \
     oracle solution. You have deep knowledge of:\n\
     - Chainlink: price feeds, sports data (TheRundown), weather (AccuWeather), VRF\n\
     - Pyth: real-time crypto/stock prices, sub-second updates, pull-based\n\
     - Band Protocol: cross-chain data, custom API requests\n\
     - UMA: optimistic oracle with human verification, disputes, complex events\n\
     - API3: first-party oracles, signed data, weather (NOAA), NFTs\n\
     \n\
     Always respond with valid JSON matching the provided schema. Focus on accuracy, \
     cost-effectiveness, and reliability for the specific use case."
        .to_string()
}

fn user_prompt(request: &RoutingRequest, basic: &RoutingResponse) -> String {
    let current = basic
        .selected_oracle
        .map(|p| p.to_string())
        .unwrap_or_else(|| "none".into());
    format!(
        "Analyze this prediction market question and optimize the oracle selection:\n\
         \n\
         Question: {}\n\
         \n\
         Current analysis:\n\
         - Selected oracle: {}\n\
         - Confidence: {:.2}\n\
         - Reasoning: {}\n\
         \n\
         Respond with JSON matching this schema:\n{}\n\
         \n\
         Include a confidence_boost in [0, 0.5] reflecting how much your analysis \
         strengthens the selection.",
        request.question,
        current,
        basic.confidence_score,
        basic.reasoning,
        serde_json::to_string_pretty(&routing_response_schema()).unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::contracts::ContractProvider;
    use crate::models::{ResolutionMethod, UpdateFrequency};

    fn basic_response(confidence: f64) -> RoutingResponse {
        RoutingResponse {
            can_resolve: true,
            selected_oracle: Some(OracleProvider::Chainlink),
            reasoning: "Chainlink selected for reliable aggregated price feeds".into(),
            oracle_config: None,
            alternatives: vec![OracleProvider::Pyth],
            data_type: Some(DataCategory::Price),
            required_feeds: vec!["BTC".into()],
            estimated_cost_usd: Some(0.50),
            estimated_latency_ms: Some(500),
            confidence_score: confidence,
            resolution_method: Some(ResolutionMethod::Aggregated),
            update_frequency: Some(UpdateFrequency::HighFreq),
        }
    }

    fn enhancement(boost: f64) -> OracleRoutingResponse {
        OracleRoutingResponse {
            selected_oracle: ContractProvider::Uma,
            reasoning: "UMA's optimistic oracle fits multi-condition questions that need \
                        human verification before settling on-chain."
                .into(),
            confidence: 0.85,
            estimated_cost: Some(100.0),
            estimated_time: Some(7200),
            fallback_options: vec![ContractProvider::Chainlink],
            confidence_boost: Some(boost),
        }
    }

    fn gate_service() -> EnhancementService {
        EnhancementService::new(Arc::new(LlmRouter::from_clients(vec![])), "gpt-4o-mini")
    }

    #[test]
    fn gate_triggers_on_low_confidence() {
        let service = gate_service();
        let request = RoutingRequest::new("Will BTC exceed $100k?");
        assert!(service.should_enhance(&request, &basic_response(0.55)));
        assert!(!service.should_enhance(&request, &basic_response(0.9)));
    }

    #[test]
    fn gate_triggers_on_conjunctions_and_categories() {
        let service = gate_service();
        let compound = RoutingRequest::new("Will BTC rise and will ETH fall?");
        assert!(service.should_enhance(&compound, &basic_response(0.9)));

        let simple = RoutingRequest::new("Will BTC rise?");
        let mut events = basic_response(0.9);
        events.data_type = Some(DataCategory::Events);
        assert!(service.should_enhance(&simple, &events));

        let mut expensive = basic_response(0.9);
        expensive.estimated_cost_usd = Some(100.0);
        assert!(service.should_enhance(&simple, &expensive));
    }

    #[test]
    fn merge_applies_selection_boost_and_reasoning() {
        // Mirrors the enhancement scenario: basic 0.55 + boost 0.2 -> 0.75
        let basic = basic_response(0.55);
        let candidates = vec![OracleProvider::Chainlink, OracleProvider::Uma];
        let merged = apply_enhancement(&basic, &enhancement(0.2), &candidates);

        assert_eq!(merged.selected_oracle, Some(OracleProvider::Uma));
        assert!((merged.confidence_score - 0.75).abs() < 1e-9);
        assert!(merged.reasoning.contains("optimistic oracle"));
        assert!(merged
            .reasoning
            .contains("(enhanced from: Chainlink selected for reliable aggregated price feeds)"));
        // Untouched fields
        assert_eq!(merged.alternatives, basic.alternatives);
        assert_eq!(merged.estimated_cost_usd, basic.estimated_cost_usd);
        assert_eq!(merged.estimated_latency_ms, basic.estimated_latency_ms);
    }

    #[test]
    fn merge_keeps_basic_selection_when_llm_pick_not_in_candidates() {
        let basic = basic_response(0.55);
        // UMA is not a candidate here
        let candidates = vec![OracleProvider::Chainlink, OracleProvider::Pyth];
        let merged = apply_enhancement(&basic, &enhancement(0.1), &candidates);
        assert_eq!(merged.selected_oracle, Some(OracleProvider::Chainlink));
        assert!((merged.confidence_score - 0.65).abs() < 1e-9);
    }

    #[test]
    fn merge_caps_confidence_at_one() {
        let basic = basic_response(0.9);
        let merged = apply_enhancement(&basic, &enhancement(0.5), &[OracleProvider::Uma]);
        assert!((merged.confidence_score - 1.0).abs() < f64::EPSILON);
    }
}
