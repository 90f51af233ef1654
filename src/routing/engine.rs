//! Rule-based routing engine.
//!
//! `route` is a pure function over the static capability table: classify,
//! filter by hard constraints, rank, apply category-specialization rules, and
//! assemble the provider-specific configuration. "No candidate" is a value
//! (`can_resolve = false`), never an error.

use super::classifier::QuestionClassifier;
use crate::models::capabilities::resolution_method_for;
use crate::models::{
    default_capabilities, DataCategory, OracleProvider, ProviderCapabilities,
    QuestionRequirements, RoutingRequest, RoutingResponse,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

const CRYPTO_MAJORS: [&str; 4] = ["BTC", "ETH", "SOL", "AVAX"];
const STOCK_MAJORS: [&str; 4] = ["AAPL", "TSLA", "MSFT", "GOOGL"];
const FED_KEYWORDS: [&str; 5] = ["fed", "federal reserve", "powell", "fomc", "interest rate"];
const CORPORATE_KEYWORDS: [&str; 5] = ["announce", "launch", "ipo", "earnings", "merger"];
const SOCIAL_KEYWORDS: [&str; 5] = ["tweet", "post", "follower", "ban", "suspend"];

pub struct RoutingEngine {
    classifier: QuestionClassifier,
    capabilities: HashMap<OracleProvider, ProviderCapabilities>,
}

impl Default for RoutingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingEngine {
    pub fn new() -> Self {
        Self {
            classifier: QuestionClassifier::new(),
            capabilities: default_capabilities(),
        }
    }

    pub fn capabilities(&self) -> &HashMap<OracleProvider, ProviderCapabilities> {
        &self.capabilities
    }

    /// Route a question to the best oracle under the request's constraints.
    pub fn route(&self, request: &RoutingRequest) -> RoutingResponse {
        let classification = self
            .classifier
            .classify(&request.question, request.category_hint);
        let category = classification.category;
        let base_confidence = classification.confidence;
        let requirements = classification.requirements;

        let suitable = self.find_suitable_oracles(category, request);
        if suitable.is_empty() {
            return RoutingResponse {
                data_type: Some(category),
                ..RoutingResponse::unresolvable(
                    format!("No oracle supports {category} data with your requirements"),
                    base_confidence,
                )
            };
        }

        let (selected, reasoning) =
            self.select_best_oracle(&suitable, category, &requirements, &request.question);
        let capabilities = &self.capabilities[&selected];
        let boost = self.confidence_boost(selected, category, &requirements);
        let confidence = (base_confidence + boost).min(1.0);

        debug!(
            question = %request.question,
            category = %category,
            selected = %selected,
            confidence,
            "routing decision"
        );

        RoutingResponse {
            can_resolve: true,
            selected_oracle: Some(selected),
            reasoning,
            oracle_config: Some(self.build_oracle_config(selected, category, &requirements)),
            alternatives: suitable
                .iter()
                .filter(|p| **p != selected)
                .take(2)
                .copied()
                .collect(),
            data_type: Some(category),
            required_feeds: requirements.assets.clone(),
            estimated_cost_usd: Some(capabilities.cost_usd),
            estimated_latency_ms: Some(capabilities.latency_ms),
            confidence_score: confidence,
            resolution_method: Some(resolution_method_for(selected)),
            update_frequency: Some(capabilities.update_frequency),
        }
    }

    /// Constraint filter + preference ranking. Ties break alphabetically by
    /// provider name so routing stays deterministic.
    fn find_suitable_oracles(
        &self,
        category: DataCategory,
        request: &RoutingRequest,
    ) -> Vec<OracleProvider> {
        let mut suitable: Vec<OracleProvider> = OracleProvider::ALL
            .iter()
            .filter(|provider| {
                let caps = &self.capabilities[provider];
                if let Some(preferred) = &request.preferred_providers {
                    if !preferred.is_empty() && !preferred.contains(provider) {
                        return false;
                    }
                }
                if !caps.supports(category) {
                    return false;
                }
                if let Some(required) = &request.required_chains {
                    let supported: Vec<String> = caps
                        .supported_chains
                        .iter()
                        .map(|c| c.to_lowercase())
                        .collect();
                    if !required.iter().any(|c| supported.contains(&c.to_lowercase())) {
                        return false;
                    }
                }
                if matches!(request.max_latency_ms, Some(max) if caps.latency_ms > max) {
                    return false;
                }
                if matches!(request.max_cost_usd, Some(max) if caps.cost_usd > max) {
                    return false;
                }
                true
            })
            .copied()
            .collect();

        suitable.sort_by(|a, b| {
            let score_a = self.preference_score(*a, category);
            let score_b = self.preference_score(*b, category);
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.as_str().cmp(b.as_str()))
        });
        suitable
    }

    /// Reliability plus a specialty bonus plus a small inverse-latency term.
    fn preference_score(&self, provider: OracleProvider, category: DataCategory) -> f64 {
        let caps = &self.capabilities[&provider];
        let mut score = caps.reliability;
        if caps.has_specialty(category) {
            score += 0.1;
        }
        score += 0.05 / (caps.latency_ms as f64 / 1000.0 + 1.0);
        score
    }

    /// Category-specialization rules, applied in a fixed order; the first
    /// matching rule whose candidate survived the constraint filter wins.
    fn select_best_oracle(
        &self,
        suitable: &[OracleProvider],
        category: DataCategory,
        requirements: &QuestionRequirements,
        question: &str,
    ) -> (OracleProvider, String) {
        use OracleProvider::*;
        let question_lower = question.to_lowercase();
        let available = |p: OracleProvider| suitable.contains(&p);

        if category == DataCategory::Price && !requirements.assets.is_empty() {
            let crypto: Vec<&String> = requirements
                .assets
                .iter()
                .filter(|a| CRYPTO_MAJORS.contains(&a.as_str()))
                .collect();
            if !crypto.is_empty() {
                let assets = requirements.assets.join(", ");
                if available(Pyth) {
                    return (
                        Pyth,
                        format!(
                            "Pyth Network selected for {assets} - provides sub-second price \
                             updates from major exchanges with 100ms latency"
                        ),
                    );
                }
                if available(Chainlink) {
                    return (
                        Chainlink,
                        format!(
                            "Chainlink selected for {assets} - industry-leading price \
                             aggregation with 99% uptime"
                        ),
                    );
                }
            }
        }

        if category == DataCategory::Sports {
            if available(Chainlink) {
                return (
                    Chainlink,
                    "Chainlink selected for sports data - official game results via \
                     TheRundown and SportsdataIO partnerships"
                        .into(),
                );
            }
            if available(Api3) {
                return (
                    Api3,
                    "API3 selected for sports data - first-party oracle connections to \
                     major sports APIs"
                        .into(),
                );
            }
        }

        if category == DataCategory::Election && available(Uma) {
            return (
                Uma,
                "UMA Optimistic Oracle selected for election results - human verification \
                 ensures accuracy with dispute resolution mechanism"
                    .into(),
            );
        }

        if category == DataCategory::Economic {
            if FED_KEYWORDS.iter().any(|k| question_lower.contains(k)) {
                if available(Uma) {
                    return (
                        Uma,
                        "UMA selected for Fed decisions - optimistic oracle with human \
                         verification of official FOMC statements"
                            .into(),
                    );
                }
            } else if available(Chainlink) {
                return (
                    Chainlink,
                    "Chainlink selected for economic data - automated feeds from official \
                     government sources"
                        .into(),
                );
            }
        }

        if category == DataCategory::Weather {
            if available(Api3) {
                return (
                    Api3,
                    "API3 selected for weather data - direct first-party connections to \
                     NOAA and AccuWeather"
                        .into(),
                );
            }
            if available(Chainlink) {
                return (
                    Chainlink,
                    "Chainlink selected for weather data - verified AccuWeather integration \
                     with high reliability"
                        .into(),
                );
            }
        }

        if matches!(category, DataCategory::Custom | DataCategory::Events) {
            if CORPORATE_KEYWORDS.iter().any(|k| question_lower.contains(k)) && available(Uma) {
                return (
                    Uma,
                    "UMA selected for corporate events - optimistic oracle ensures accurate \
                     verification of official announcements"
                        .into(),
                );
            }
            if SOCIAL_KEYWORDS.iter().any(|k| question_lower.contains(k)) && available(Band) {
                return (
                    Band,
                    "Band Protocol selected for social media data - flexible API \
                     integration for real-time social metrics"
                        .into(),
                );
            }
        }

        if category == DataCategory::Nft && available(Api3) {
            return (
                Api3,
                "API3 selected for NFT floor prices - direct OpenSea and Blur marketplace \
                 connections"
                    .into(),
            );
        }

        // Top of the preference ranking, with its numbers spelled out
        let best = suitable[0];
        let caps = &self.capabilities[&best];
        let reasoning = format!(
            "{} selected as optimal choice - {:.0}% reliability, {}ms latency, ${:.2} \
             estimated cost",
            best,
            caps.reliability * 100.0,
            caps.latency_ms,
            caps.cost_usd
        );
        (best, reasoning)
    }

    /// Specialization boost: +0.15 category specialty, +0.10 asset-family
    /// match, +0.05 for reliability at or above 0.98.
    fn confidence_boost(
        &self,
        provider: OracleProvider,
        category: DataCategory,
        requirements: &QuestionRequirements,
    ) -> f64 {
        let caps = &self.capabilities[&provider];
        let mut boost = 0.0;

        if caps.has_specialty(category) {
            boost += 0.15;
        }

        if category == DataCategory::Price && !requirements.assets.is_empty() {
            let has_crypto = requirements
                .assets
                .iter()
                .any(|a| CRYPTO_MAJORS.contains(&a.as_str()));
            let has_stock = requirements
                .assets
                .iter()
                .any(|a| STOCK_MAJORS.contains(&a.as_str()));
            if provider == OracleProvider::Pyth && has_crypto {
                boost += 0.10;
            } else if provider == OracleProvider::Chainlink && has_stock {
                boost += 0.10;
            }
        }

        if caps.reliability >= 0.98 {
            boost += 0.05;
        }

        boost
    }

    /// Provider-specific query configuration for the selected oracle.
    fn build_oracle_config(
        &self,
        provider: OracleProvider,
        category: DataCategory,
        requirements: &QuestionRequirements,
    ) -> Value {
        let mut config = json!({
            "provider": provider.as_str(),
            "category": category.as_str(),
            "requirements": requirements,
        });
        let extra = match provider {
            OracleProvider::Chainlink => json!({
                "feed_type": if category == DataCategory::Price { "price_feed" } else { "data_feed" },
                "pairs": requirements.assets.iter().map(|a| format!("{a}/USD")).collect::<Vec<_>>(),
                "aggregation": "median",
                "heartbeat": 3600,
            }),
            OracleProvider::Pyth => json!({
                "update_type": "pull_based",
                "confidence_interval": true,
                "feed_ids": &requirements.assets,
            }),
            OracleProvider::Uma => json!({
                "oracle_type": "optimistic",
                "liveness_period": 7200,
                "bond_amount": "100",
                "dispute_mechanism": true,
            }),
            OracleProvider::Band => json!({
                "request_type": "custom",
                "data_sources": &requirements.assets,
                "aggregation_method": "weighted_average",
            }),
            OracleProvider::Api3 => json!({
                "api_type": "first_party",
                "signed_data": true,
                "data_feeds": &requirements.assets,
            }),
        };
        if let (Value::Object(base), Value::Object(extra)) = (&mut config, extra) {
            base.extend(extra);
        }
        config
    }
}
