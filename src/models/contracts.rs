//! Contract-compatible structs.
//!
//! These shapes are consumed by on-chain encoders and produced by LLM calls;
//! their JSON forms are bit-exact contracts. Validation is two-phase: the
//! caller first parses JSON syntactically, then runs `validate()` (or
//! `from_llm_json`, which also normalizes enum casing). Validation failures on
//! LLM output are recoverable [`crate::OracleError::AiService`] conditions,
//! never panics.

use super::capabilities::OracleProvider;
use crate::{OracleError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref ADDRESS_RE: Regex = Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap();
    static ref BYTES32_RE: Regex = Regex::new(r"^0x[0-9a-fA-F]{64}$").unwrap();
}

/// Whether `s` is a valid Ethereum address string (`0x` + 40 hex).
pub fn is_valid_address(s: &str) -> bool {
    ADDRESS_RE.is_match(s)
}

/// Whether `s` is a valid bytes32 string (`0x` + 64 hex).
pub fn is_valid_bytes32(s: &str) -> bool {
    BYTES32_RE.is_match(s)
}

/// The all-zero address, accepted wherever an address is optional on-chain.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Provider selector as the on-chain contracts know it.
///
/// The wire value is uppercase; lowercase spellings are accepted on input.
/// `Custom` covers data sources outside the standard networks (Band routes
/// through it on the contract side).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContractProvider {
    #[serde(alias = "chainlink")]
    Chainlink,
    #[serde(alias = "pyth")]
    Pyth,
    #[serde(alias = "uma")]
    Uma,
    #[serde(alias = "api3")]
    Api3,
    #[serde(alias = "custom")]
    Custom,
}

impl ContractProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractProvider::Chainlink => "CHAINLINK",
            ContractProvider::Pyth => "PYTH",
            ContractProvider::Uma => "UMA",
            ContractProvider::Api3 => "API3",
            ContractProvider::Custom => "CUSTOM",
        }
    }

    /// The internal provider this selector dispatches to, when one exists.
    pub fn to_oracle_provider(&self) -> Option<OracleProvider> {
        match self {
            ContractProvider::Chainlink => Some(OracleProvider::Chainlink),
            ContractProvider::Pyth => Some(OracleProvider::Pyth),
            ContractProvider::Uma => Some(OracleProvider::Uma),
            ContractProvider::Api3 => Some(OracleProvider::Api3),
            ContractProvider::Custom => None,
        }
    }
}

impl From<OracleProvider> for ContractProvider {
    fn from(provider: OracleProvider) -> Self {
        match provider {
            OracleProvider::Chainlink => ContractProvider::Chainlink,
            OracleProvider::Pyth => ContractProvider::Pyth,
            OracleProvider::Uma => ContractProvider::Uma,
            OracleProvider::Api3 => ContractProvider::Api3,
            // No first-class selector on the contract side
            OracleProvider::Band => ContractProvider::Custom,
        }
    }
}

impl fmt::Display for ContractProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContractProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CHAINLINK" => Ok(ContractProvider::Chainlink),
            "PYTH" => Ok(ContractProvider::Pyth),
            "UMA" => Ok(ContractProvider::Uma),
            "API3" => Ok(ContractProvider::Api3),
            "CUSTOM" | "BAND" => Ok(ContractProvider::Custom),
            other => Err(format!("unknown contract provider: {other}")),
        }
    }
}

/// Generic oracle observation as encoded on-chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OracleData {
    pub value: u128,
    pub timestamp: u64,
    /// Basis points, `0..=10000`
    pub confidence: u32,
    /// bytes32 hex string
    pub data_id: String,
    pub source: String,
}

impl OracleData {
    pub fn validate(&self) -> Result<()> {
        if self.confidence > 10_000 {
            return Err(OracleError::Validation(format!(
                "oracle data confidence {} exceeds 10000 basis points",
                self.confidence
            )));
        }
        if !is_valid_bytes32(&self.data_id) {
            return Err(OracleError::Validation(format!(
                "data_id is not a bytes32 hex string: {}",
                self.data_id
            )));
        }
        Ok(())
    }
}

/// Price observation as encoded on-chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceData {
    pub price: u128,
    pub timestamp: u64,
    /// `0..=18`
    pub decimals: u8,
    pub confidence: u128,
    /// bytes32 hex string
    pub feed_id: String,
}

impl PriceData {
    pub fn validate(&self) -> Result<()> {
        if self.decimals > 18 {
            return Err(OracleError::Validation(format!(
                "price decimals {} out of range 0..=18",
                self.decimals
            )));
        }
        if !is_valid_bytes32(&self.feed_id) {
            return Err(OracleError::Validation(format!(
                "feed_id is not a bytes32 hex string: {}",
                self.feed_id
            )));
        }
        Ok(())
    }
}

/// Final resolution record as encoded on-chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolutionData {
    pub result: u128,
    pub resolved: bool,
    pub timestamp: u64,
    /// Hex-encoded proof bytes
    pub proof: String,
    pub metadata: String,
}

/// Routing outcome as encoded on-chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteResult {
    pub success: bool,
    pub selected_provider: ContractProvider,
    /// Ethereum address string; the zero address when not applicable
    pub oracle_address: String,
    pub estimated_cost: u128,
    pub reason: String,
}

impl RouteResult {
    pub fn validate(&self) -> Result<()> {
        if self.oracle_address != ZERO_ADDRESS && !is_valid_address(&self.oracle_address) {
            return Err(OracleError::Validation(format!(
                "oracle_address is not a valid address: {}",
                self.oracle_address
            )));
        }
        Ok(())
    }
}

/// LLM-facing routing recommendation, validated against the contract shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OracleRoutingResponse {
    pub selected_oracle: ContractProvider,
    /// At least 50 characters of justification
    pub reasoning: String,
    /// The model's own confidence in its selection, in `[0, 1]`
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
    /// Seconds to resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<u64>,
    #[serde(default)]
    pub fallback_options: Vec<ContractProvider>,
    /// Additive adjustment to the rule-based confidence, clamped to `[0, 0.5]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_boost: Option<f64>,
}

impl OracleRoutingResponse {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(OracleError::Validation(format!(
                "confidence {} out of range [0, 1]",
                self.confidence
            )));
        }
        if self.reasoning.trim().len() < 50 {
            return Err(OracleError::Validation(
                "reasoning must be at least 50 characters".into(),
            ));
        }
        if let Some(boost) = self.confidence_boost {
            if !(0.0..=0.5).contains(&boost) {
                return Err(OracleError::Validation(format!(
                    "confidence_boost {boost} out of range [0, 0.5]"
                )));
            }
        }
        if let Some(cost) = self.estimated_cost {
            if cost < 0.0 {
                return Err(OracleError::Validation("estimated_cost is negative".into()));
            }
        }
        Ok(())
    }

    /// Parse model output: syntactic parse first, then schema validation with
    /// normalized enum casing. Returns an `AiService` error on any mismatch.
    pub fn from_llm_json(raw: &Value) -> Result<Self> {
        let normalized = normalize_enum_casing(raw, &["selected_oracle", "fallback_options"]);
        let parsed: OracleRoutingResponse = serde_json::from_value(normalized)
            .map_err(|e| OracleError::AiService(format!("routing response schema mismatch: {e}")))?;
        parsed
            .validate()
            .map_err(|e| OracleError::AiService(format!("routing response invalid: {e}")))?;
        Ok(parsed)
    }
}

/// LLM-facing market resolution, validated against the contract shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionMarketResolution {
    /// Index into the market's outcome list, `0..=255`
    pub winning_outcome: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_value: Option<i64>,
    pub confidence: f64,
    /// At least one source backing the resolution
    pub data_sources: Vec<String>,
    /// At least 100 characters citing the decisive data
    pub reasoning: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_hash: Option<String>,
}

impl PredictionMarketResolution {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(OracleError::Validation(format!(
                "confidence {} out of range [0, 1]",
                self.confidence
            )));
        }
        if self.data_sources.is_empty() {
            return Err(OracleError::Validation(
                "resolution must cite at least one data source".into(),
            ));
        }
        if self.reasoning.trim().len() < 100 {
            return Err(OracleError::Validation(
                "reasoning must be at least 100 characters".into(),
            ));
        }
        if let Some(hash) = &self.proof_hash {
            if !is_valid_bytes32(hash) {
                return Err(OracleError::Validation(format!(
                    "proof_hash is not a bytes32 hex string: {hash}"
                )));
            }
        }
        Ok(())
    }

    pub fn from_llm_json(raw: &Value) -> Result<Self> {
        let parsed: PredictionMarketResolution = serde_json::from_value(raw.clone())
            .map_err(|e| OracleError::AiService(format!("resolution schema mismatch: {e}")))?;
        parsed
            .validate()
            .map_err(|e| OracleError::AiService(format!("resolution invalid: {e}")))?;
        Ok(parsed)
    }
}

/// LLM-facing assessment of oracle data quality.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OracleDataValidation {
    pub is_valid: bool,
    pub confidence_score: f64,
    pub anomaly_detected: bool,
    pub data_freshness_seconds: u64,
    pub source_reliability: f64,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl OracleDataValidation {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_score) {
            return Err(OracleError::Validation(format!(
                "confidence_score {} out of range [0, 1]",
                self.confidence_score
            )));
        }
        if !(0.0..=1.0).contains(&self.source_reliability) {
            return Err(OracleError::Validation(format!(
                "source_reliability {} out of range [0, 1]",
                self.source_reliability
            )));
        }
        Ok(())
    }

    pub fn from_llm_json(raw: &Value) -> Result<Self> {
        let parsed: OracleDataValidation = serde_json::from_value(raw.clone())
            .map_err(|e| OracleError::AiService(format!("validation schema mismatch: {e}")))?;
        parsed
            .validate()
            .map_err(|e| OracleError::AiService(format!("validation result invalid: {e}")))?;
        Ok(parsed)
    }
}

/// Uppercase the string at `fields` (and inside arrays at those fields) so
/// models that emit lowercase enum spellings still validate.
fn normalize_enum_casing(raw: &Value, fields: &[&str]) -> Value {
    let mut value = raw.clone();
    if let Value::Object(map) = &mut value {
        for field in fields {
            match map.get_mut(*field) {
                Some(Value::String(s)) => *s = s.to_ascii_uppercase(),
                Some(Value::Array(items)) => {
                    for item in items {
                        if let Value::String(s) = item {
                            *s = s.to_ascii_uppercase();
                        }
                    }
                }
                _ => {}
            }
        }
    }
    value
}

/// JSON schema for [`OracleRoutingResponse`], embedded in enhancement prompts.
pub fn routing_response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "selected_oracle": {
                "type": "string",
                "enum": ["CHAINLINK", "PYTH", "UMA", "API3", "CUSTOM"]
            },
            "reasoning": { "type": "string", "minLength": 50 },
            "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
            "estimated_cost": { "type": "number", "minimum": 0.0 },
            "estimated_time": { "type": "integer", "minimum": 0 },
            "fallback_options": {
                "type": "array",
                "items": {
                    "type": "string",
                    "enum": ["CHAINLINK", "PYTH", "UMA", "API3", "CUSTOM"]
                }
            },
            "confidence_boost": { "type": "number", "minimum": 0.0, "maximum": 0.5 }
        },
        "required": ["selected_oracle", "reasoning", "confidence"]
    })
}

/// JSON schema for [`PredictionMarketResolution`], embedded in resolution prompts.
pub fn resolution_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "winning_outcome": { "type": "integer", "minimum": 0, "maximum": 255 },
            "resolution_value": { "type": "integer" },
            "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
            "data_sources": {
                "type": "array",
                "items": { "type": "string" },
                "minItems": 1
            },
            "reasoning": { "type": "string", "minLength": 100 },
            "timestamp": { "type": "integer" },
            "proof_hash": { "type": "string", "pattern": "^0x[0-9a-fA-F]{64}$" }
        },
        "required": ["winning_outcome", "confidence", "data_sources", "reasoning", "timestamp"]
    })
}

/// JSON schema for [`OracleDataValidation`], embedded in validation prompts.
pub fn data_validation_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "is_valid": { "type": "boolean" },
            "confidence_score": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
            "anomaly_detected": { "type": "boolean" },
            "data_freshness_seconds": { "type": "integer", "minimum": 0 },
            "source_reliability": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
            "issues": { "type": "array", "items": { "type": "string" } },
            "recommendations": { "type": "array", "items": { "type": "string" } }
        },
        "required": [
            "is_valid", "confidence_score", "anomaly_detected",
            "data_freshness_seconds", "source_reliability"
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_and_bytes32_patterns() {
        assert!(is_valid_address("0x1f9840a85d5aF5bf1D1762F925BDADdC4201F984"));
        assert!(is_valid_address(ZERO_ADDRESS));
        assert!(!is_valid_address("0x1234"));
        assert!(!is_valid_address("1f9840a85d5aF5bf1D1762F925BDADdC4201F984"));
        assert!(is_valid_bytes32(
            "0xe62df6c8b4a85fe1a67db44dc12de5db330f7ac66b72dc658afedf0f4a415b43"
        ));
        assert!(!is_valid_bytes32("0xe62df6c8"));
    }

    #[test]
    fn contract_provider_emits_uppercase() {
        let value = serde_json::to_value(ContractProvider::Chainlink).unwrap();
        assert_eq!(value, "CHAINLINK");
        // Both spellings accepted on input
        let upper: ContractProvider = serde_json::from_value(json!("PYTH")).unwrap();
        let lower: ContractProvider = serde_json::from_value(json!("pyth")).unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn routing_response_validation_rules() {
        let mut response = OracleRoutingResponse {
            selected_oracle: ContractProvider::Uma,
            reasoning: "UMA's optimistic oracle provides human verification suited to \
                        disputed election outcomes with an explicit challenge window."
                .into(),
            confidence: 0.8,
            estimated_cost: Some(100.0),
            estimated_time: Some(7200),
            fallback_options: vec![ContractProvider::Chainlink],
            confidence_boost: Some(0.2),
        };
        response.validate().unwrap();

        response.reasoning = "too short".into();
        assert!(response.validate().is_err());
    }

    #[test]
    fn from_llm_json_normalizes_enum_case() {
        let raw = json!({
            "selected_oracle": "uma",
            "reasoning": "UMA's optimistic oracle provides human verification suited to \
                          disputed outcomes, with dispute windows as a safety valve.",
            "confidence": 0.85,
            "fallback_options": ["chainlink"],
            "confidence_boost": 0.2
        });
        let parsed = OracleRoutingResponse::from_llm_json(&raw).unwrap();
        assert_eq!(parsed.selected_oracle, ContractProvider::Uma);
        assert_eq!(parsed.fallback_options, vec![ContractProvider::Chainlink]);
    }

    #[test]
    fn from_llm_json_rejects_out_of_range_boost() {
        let raw = json!({
            "selected_oracle": "PYTH",
            "reasoning": "Pyth publishes sub-second price updates with confidence intervals, \
                          the right fit for crypto threshold questions.",
            "confidence": 0.9,
            "confidence_boost": 0.9
        });
        let err = OracleRoutingResponse::from_llm_json(&raw).unwrap_err();
        assert_eq!(err.kind(), "AI_SERVICE");
    }

    #[test]
    fn resolution_requires_sources_and_long_reasoning() {
        let raw = json!({
            "winning_outcome": 0,
            "resolution_value": 105000,
            "confidence": 0.98,
            "data_sources": ["coinbase", "binance"],
            "reasoning": "Bitcoin traded above the $100,000 threshold on multiple major venues \
                          before the deadline; spot prices were confirmed across exchanges with \
                          consistent volume-weighted data.",
            "timestamp": 1734220800
        });
        PredictionMarketResolution::from_llm_json(&raw).unwrap();

        let missing_sources = json!({
            "winning_outcome": 0,
            "confidence": 0.9,
            "data_sources": [],
            "reasoning": "x".repeat(120),
            "timestamp": 1734220800
        });
        assert!(PredictionMarketResolution::from_llm_json(&missing_sources).is_err());
    }

    #[test]
    fn band_maps_to_custom_selector() {
        assert_eq!(
            ContractProvider::from(OracleProvider::Band),
            ContractProvider::Custom
        );
    }
}
