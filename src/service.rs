//! Top-level orchestrator: classify -> route -> (optionally) enhance, plus the
//! price and resolution entry points that drive adapters through the registry
//! and aggregator.

use crate::adapters::{
    Api3Adapter, AdapterRegistry, BandAdapter, ChainlinkAdapter, HealthStatus, OracleAdapter,
    PythAdapter, UmaAdapter,
};
use crate::aggregator::Aggregator;
use crate::ai::{EnhancementService, LlmRouter, MarketResolver};
use crate::config::OracleConfig;
use crate::models::contracts::{OracleDataValidation, PredictionMarketResolution};
use crate::models::{
    AggregatedOracleData, DataCategory, OracleProvider, OracleRequest, OracleResponse,
    RoutingRequest, RoutingResponse,
};
use crate::routing::RoutingEngine;
use crate::transport::{ttl_for_category, CacheManager, HttpSession, MemoryCache};
use crate::{OracleError, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Result of a price lookup: one adapter's answer or a cross-checked
/// aggregate.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PriceResult {
    Single(OracleResponse),
    Aggregated(AggregatedOracleData),
}

/// The routing and resolution façade the rest of the backend talks to.
pub struct OracleRoutingService {
    config: Arc<OracleConfig>,
    registry: Arc<AdapterRegistry>,
    engine: RoutingEngine,
    aggregator: Aggregator,
    enhancer: Option<EnhancementService>,
    resolver: Option<MarketResolver>,
    cache: Option<CacheManager>,
}

impl OracleRoutingService {
    /// Wire up the service: shared HTTP session, one adapter per enabled
    /// provider, the LLM chain when AI routing is on, and the routing cache.
    pub fn new(config: OracleConfig) -> Result<Self> {
        let config = Arc::new(config);
        let session = Arc::new(HttpSession::new(Duration::from_secs(config.timeout_secs))?);

        let registry = Arc::new(AdapterRegistry::new());
        let adapters: Vec<Arc<dyn OracleAdapter>> = vec![
            Arc::new(ChainlinkAdapter::new(session.clone(), &config.provider("chainlink"))),
            Arc::new(PythAdapter::new(session.clone(), &config.provider("pyth"))),
            Arc::new(BandAdapter::new(session.clone(), &config.provider("band"))),
            Arc::new(UmaAdapter::new(session.clone(), &config.provider("uma"))),
            Arc::new(Api3Adapter::new(session.clone(), &config.provider("api3"))),
        ];
        for adapter in adapters {
            if config.provider(adapter.name()).enabled {
                registry.register(adapter);
            } else {
                info!(adapter = adapter.name(), "provider disabled by configuration");
            }
        }

        let (enhancer, resolver) = if config.enable_ai {
            let llm = Arc::new(LlmRouter::from_keys(
                config.openrouter_api_key.clone(),
                config.openai_api_key.clone(),
                config.anthropic_api_key.clone(),
            ));
            (
                Some(EnhancementService::new(llm.clone(), &config.ai_model)),
                Some(MarketResolver::new(llm, &config.ai_model)),
            )
        } else {
            (None, None)
        };

        let cache = config.cache_enabled.then(|| {
            CacheManager::new(
                Box::new(MemoryCache::new(
                    config.cache_max_size,
                    Duration::from_secs(config.cache_ttl_secs),
                )),
                "oracle",
                Duration::from_secs(config.cache_ttl_secs),
            )
        });

        let aggregator = Aggregator::new(registry.clone());
        info!(
            adapters = registry.list().len(),
            ai = config.enable_ai,
            cache = config.cache_enabled,
            "oracle routing service ready"
        );

        Ok(Self {
            config,
            registry,
            engine: RoutingEngine::new(),
            aggregator,
            enhancer,
            resolver,
            cache,
        })
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// Route a question to the best oracle, enhancing with the LLM when the
    /// gate fires. Responses are cached under the canonical request key with
    /// the category's TTL.
    pub async fn route_question(&self, request: &RoutingRequest) -> Result<RoutingResponse> {
        if request.question.trim().is_empty() {
            return Ok(RoutingResponse::unresolvable("Question is empty", 0.0));
        }

        let cache_key = self.routing_cache_key(request)?;
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&cache_key).await? {
                if let Ok(cached) = serde_json::from_value::<RoutingResponse>(hit) {
                    debug!(question = %request.question, "routing cache hit");
                    return Ok(cached);
                }
            }
        }

        let basic = self.engine.route(request);
        let response = match (&self.enhancer, basic.can_resolve) {
            (Some(enhancer), true) if enhancer.should_enhance(request, &basic) => {
                let mut candidates = vec![basic.selected_oracle.expect("resolvable")];
                candidates.extend(&basic.alternatives);
                enhancer.enhance(request, basic, &candidates).await
            }
            _ => basic,
        };

        if let Some(cache) = &self.cache {
            let ttl = response.data_type.map(ttl_for_category);
            cache
                .set(&cache_key, serde_json::to_value(&response)?, ttl)
                .await?;
        }
        Ok(response)
    }

    /// Fetch a price for `asset`: a direct adapter read when `provider` is
    /// given, otherwise an aggregated fan-out across price-capable adapters.
    pub async fn get_price(
        &self,
        asset: &str,
        provider: Option<OracleProvider>,
    ) -> Result<PriceResult> {
        if asset.trim().is_empty() {
            return Err(OracleError::Validation("asset cannot be empty".into()));
        }
        let pair = if asset.contains('/') {
            asset.to_ascii_uppercase()
        } else {
            format!("{}/USD", asset.to_ascii_uppercase())
        };
        let request = OracleRequest::new(pair, DataCategory::Price)
            .with_timeout_ms(self.config.timeout_secs * 1000);

        match provider {
            Some(provider) => {
                let adapter = self.registry.get(provider.as_str()).ok_or_else(|| {
                    OracleError::Unsupported(format!("{provider} adapter is not registered"))
                })?;
                Ok(PriceResult::Single(adapter.query(&request).await?))
            }
            None => {
                let aggregated = self.get_aggregated_price(asset, None).await?;
                Ok(PriceResult::Aggregated(aggregated))
            }
        }
    }

    /// Cross-check a price across several providers (all price-capable
    /// adapters by default).
    pub async fn get_aggregated_price(
        &self,
        asset: &str,
        providers: Option<Vec<OracleProvider>>,
    ) -> Result<AggregatedOracleData> {
        let pair = if asset.contains('/') {
            asset.to_ascii_uppercase()
        } else {
            format!("{}/USD", asset.to_ascii_uppercase())
        };
        let request = OracleRequest::new(pair, DataCategory::Price)
            .with_timeout_ms(self.config.timeout_secs * 1000);

        let names: Vec<String> = match providers {
            Some(providers) => providers.iter().map(|p| p.as_str().to_string()).collect(),
            None => self
                .registry
                .adapters_for(DataCategory::Price)
                .iter()
                .map(|a| a.name().to_string())
                .collect(),
        };
        self.aggregator
            .aggregate(DataCategory::Price, &request, &names, None)
            .await
    }

    /// Query one specific provider with a fully-formed canonical request.
    pub async fn query_provider(
        &self,
        provider: OracleProvider,
        request: &OracleRequest,
    ) -> Result<OracleResponse> {
        let adapter = self.registry.get(provider.as_str()).ok_or_else(|| {
            OracleError::Unsupported(format!("{provider} adapter is not registered"))
        })?;
        adapter.query(request).await
    }

    /// Resolve a market from oracle evidence via the LLM resolver.
    pub async fn resolve_market(
        &self,
        question: &str,
        options: &[String],
        oracle_data: &Value,
    ) -> Result<PredictionMarketResolution> {
        let resolver = self.resolver.as_ref().ok_or_else(|| {
            OracleError::AiService("AI routing is disabled; cannot resolve markets".into())
        })?;
        resolver.resolve_market(question, options, oracle_data).await
    }

    /// Assess oracle data quality via the LLM validator.
    pub async fn validate_oracle_data(
        &self,
        data_points: &[Value],
        expected_data_type: &str,
        quality_threshold: f64,
    ) -> Result<OracleDataValidation> {
        let resolver = self.resolver.as_ref().ok_or_else(|| {
            OracleError::AiService("AI routing is disabled; cannot validate data".into())
        })?;
        resolver
            .validate_oracle_data(data_points, expected_data_type, quality_threshold)
            .await
    }

    /// Health report across every registered adapter.
    pub async fn adapter_health(&self) -> HashMap<String, HealthStatus> {
        let mut report = HashMap::new();
        for name in self.registry.list() {
            if let Some(adapter) = self.registry.get(&name) {
                report.insert(name, adapter.health_check().await);
            }
        }
        report
    }

    fn routing_cache_key(&self, request: &RoutingRequest) -> Result<String> {
        let value = serde_json::to_value(request)?;
        Ok(format!(
            "route:{}",
            crate::transport::cache_key_for_request(&value)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> OracleRoutingService {
        let config = OracleConfig {
            enable_ai: false,
            cache_enabled: true,
            ..OracleConfig::default()
        };
        OracleRoutingService::new(config).unwrap()
    }

    #[tokio::test]
    async fn empty_question_is_unresolvable_not_an_error() {
        let service = service();
        let response = service
            .route_question(&RoutingRequest::new("   "))
            .await
            .unwrap();
        assert!(!response.can_resolve);
        assert_eq!(response.reasoning, "Question is empty");
    }

    #[tokio::test]
    async fn route_question_selects_and_caches() {
        let service = service();
        let request = RoutingRequest::new("Will BTC exceed $100,000 by the end of 2025?")
            .with_hint(DataCategory::Price);

        let first = service.route_question(&request).await.unwrap();
        assert!(first.can_resolve);
        assert_eq!(first.selected_oracle, Some(OracleProvider::Pyth));

        // Identical request: served from cache with an identical decision
        let second = service.route_question(&request).await.unwrap();
        assert_eq!(second.selected_oracle, first.selected_oracle);
        assert_eq!(second.confidence_score, first.confidence_score);
    }

    #[tokio::test]
    async fn all_five_adapters_register() {
        let service = service();
        assert_eq!(
            service.registry().list(),
            vec!["api3", "band", "chainlink", "pyth", "uma"]
        );
    }

    #[tokio::test]
    async fn disabled_provider_is_not_registered() {
        let mut config = OracleConfig {
            enable_ai: false,
            ..OracleConfig::default()
        };
        config.providers.get_mut("band").unwrap().enabled = false;
        let service = OracleRoutingService::new(config).unwrap();
        assert!(!service.registry().list().contains(&"band".to_string()));
    }

    #[tokio::test]
    async fn get_price_rejects_empty_asset() {
        let service = service();
        let err = service.get_price("  ", None).await.unwrap_err();
        assert_eq!(err.kind(), "VALIDATION");
    }

    #[tokio::test]
    async fn resolve_market_requires_ai() {
        let service = service();
        let err = service
            .resolve_market(
                "Will BTC exceed $100k?",
                &["Yes".into(), "No".into()],
                &serde_json::json!({}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "AI_SERVICE");
    }
}
