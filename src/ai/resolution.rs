//! LLM-driven market resolution and oracle-data validation.
//!
//! Both operations bind the model to a contract schema and repair or reject
//! out-of-range output: a winning-outcome index past the option list falls
//! back to outcome 0 with halved confidence and an explanatory note.

use super::providers::LlmRouter;
use super::{ChatMessage, LlmRequest};
use crate::models::contracts::{
    data_validation_schema, resolution_schema, OracleDataValidation, PredictionMarketResolution,
};
use crate::{OracleError, Result};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

pub struct MarketResolver {
    llm: Arc<LlmRouter>,
    model: String,
}

impl MarketResolver {
    pub fn new(llm: Arc<LlmRouter>, model: &str) -> Self {
        Self {
            llm,
            model: model.to_string(),
        }
    }

    /// Resolve a market from oracle evidence. The winning outcome is an index
    /// into `options`; out-of-range indices from the model are corrected to 0
    /// with confidence halved.
    pub async fn resolve_market(
        &self,
        question: &str,
        options: &[String],
        oracle_data: &Value,
    ) -> Result<PredictionMarketResolution> {
        if options.is_empty() {
            return Err(OracleError::Validation(
                "market must have at least one outcome option".into(),
            ));
        }

        let llm_request = LlmRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(resolution_system_prompt()),
                ChatMessage::user(resolution_user_prompt(question, options, oracle_data)),
            ],
            temperature: 0.1,
            max_tokens: 800,
            json_response: true,
        };

        let resolution = match self.llm.complete(&llm_request).await {
            Ok(completion) => {
                let raw: Result<Value> = serde_json::from_str(&completion.content).map_err(|e| {
                    OracleError::AiService(format!("model returned invalid JSON: {e}"))
                });
                match raw.and_then(|raw| PredictionMarketResolution::from_llm_json(&raw)) {
                    Ok(resolution) => resolution,
                    Err(err) => {
                        warn!(error = %err, "resolution output invalid, emitting fallback record");
                        fallback_resolution(&err.to_string())
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "LLM unavailable for resolution, emitting fallback record");
                fallback_resolution(&err.to_string())
            }
        };

        Ok(enforce_outcome_bounds(resolution, options.len()))
    }

    /// Ask the model to assess oracle data quality against a threshold.
    pub async fn validate_oracle_data(
        &self,
        data_points: &[Value],
        expected_data_type: &str,
        quality_threshold: f64,
    ) -> Result<OracleDataValidation> {
        let llm_request = LlmRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(validation_system_prompt(expected_data_type, quality_threshold)),
                ChatMessage::user(format!(
                    "Data points to validate:\n{}\n\nAnalyze this data for quality issues, \
                     anomalies, and overall reliability.\n\nRespond with JSON matching this \
                     schema:\n{}",
                    serde_json::to_string_pretty(data_points)?,
                    serde_json::to_string_pretty(&data_validation_schema())?,
                )),
            ],
            temperature: 0.2,
            max_tokens: 600,
            json_response: true,
        };

        let mut validation = match self.llm.complete(&llm_request).await {
            Ok(completion) => {
                let raw: Result<Value> = serde_json::from_str(&completion.content).map_err(|e| {
                    OracleError::AiService(format!("model returned invalid JSON: {e}"))
                });
                match raw.and_then(|raw| OracleDataValidation::from_llm_json(&raw)) {
                    Ok(validation) => validation,
                    Err(err) => fallback_validation(&err.to_string()),
                }
            }
            Err(err) => fallback_validation(&err.to_string()),
        };

        if validation.confidence_score < quality_threshold {
            validation.is_valid = false;
            validation.issues.push(format!(
                "confidence score {:.2} below threshold {:.2}",
                validation.confidence_score, quality_threshold
            ));
        }
        Ok(validation)
    }
}

/// Clamp the winning outcome into range; an invalid index defaults to 0 with
/// confidence halved and an explanatory reasoning suffix.
pub fn enforce_outcome_bounds(
    mut resolution: PredictionMarketResolution,
    option_count: usize,
) -> PredictionMarketResolution {
    if (resolution.winning_outcome as usize) >= option_count {
        warn!(
            outcome = resolution.winning_outcome,
            option_count, "model picked an out-of-range outcome, defaulting to 0"
        );
        resolution.winning_outcome = 0;
        resolution.confidence /= 2.0;
        resolution
            .reasoning
            .push_str(" (corrected invalid outcome index)");
    }
    resolution
}

fn fallback_resolution(error: &str) -> PredictionMarketResolution {
    PredictionMarketResolution {
        winning_outcome: 0,
        resolution_value: None,
        confidence: 0.3,
        data_sources: vec!["fallback".into()],
        reasoning: format!(
            "Could not obtain a valid model resolution ({error}). Defaulting to the first \
             option at reduced confidence; manual review is recommended before settlement."
        ),
        timestamp: Utc::now().timestamp(),
        proof_hash: None,
    }
}

fn fallback_validation(error: &str) -> OracleDataValidation {
    OracleDataValidation {
        is_valid: false,
        confidence_score: 0.0,
        anomaly_detected: true,
        data_freshness_seconds: u64::MAX,
        source_reliability: 0.0,
        issues: vec![format!("validation system error: {error}")],
        recommendations: vec!["manual review required".into()],
    }
}

fn resolution_system_prompt() -> String {
    "You are an impartial prediction market resolution system.\n\
     \n\
     Resolution guidelines:\n\
     1. Objectivity: base decisions solely on factual data\n\
     2. Accuracy: the winning outcome must match the data precisely\n\
     3. Transparency: cite specific data points in your reasoning\n\
     4. Confidence: only high-confidence resolutions (>0.8) should settle immediately\n\
     5. Data sources: reference every source used in your analysis"
        .to_string()
}

fn resolution_user_prompt(question: &str, options: &[String], oracle_data: &Value) -> String {
    let options_text = options
        .iter()
        .enumerate()
        .map(|(i, option)| format!("{i}: {option}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Question: {question}\n\
         \n\
         Available options:\n{options_text}\n\
         \n\
         Resolution data:\n{}\n\
         \n\
         Determine which option (by index) should win, with detailed reasoning citing \
         specific data sources.\n\
         \n\
         Respond with JSON matching this schema:\n{}",
        serde_json::to_string_pretty(oracle_data).unwrap_or_default(),
        serde_json::to_string_pretty(&resolution_schema()).unwrap_or_default(),
    )
}

fn validation_system_prompt(expected_data_type: &str, quality_threshold: f64) -> String {
    format!(
        "You are an oracle data validation system for blockchain applications.\n\
         \n\
         Validation criteria:\n\
         1. Consistency: values should agree across sources\n\
         2. Freshness: timestamps should be recent\n\
         3. Range: values should fall within expected bounds\n\
         4. Anomalies: flag outliers and suspicious patterns\n\
         5. Source reliability: assess each source\n\
         \n\
         Expected data type: {expected_data_type}\n\
         Quality threshold: {quality_threshold}"
    )
}
