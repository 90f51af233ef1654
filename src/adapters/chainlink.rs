//! Chainlink adapter: aggregated price feeds, third-party sports and weather
//! feeds, and VRF randomness requests.

use super::{AdapterCore, OracleAdapter};
use crate::config::ProviderSettings;
use crate::models::{DataCategory, OracleRequest};
use crate::transport::HttpSession;
use crate::{OracleError, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Map, Value};
use std::sync::Arc;

const DEFAULT_ENDPOINT: &str = "https://api.chain.link/v1";

pub struct ChainlinkAdapter {
    core: AdapterCore,
    session: Arc<HttpSession>,
    endpoint: String,
    api_key: Option<String>,
    categories: Vec<DataCategory>,
}

impl ChainlinkAdapter {
    pub fn new(session: Arc<HttpSession>, settings: &ProviderSettings) -> Self {
        Self {
            core: AdapterCore::new("chainlink"),
            session,
            endpoint: settings
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key: settings.api_key.clone(),
            categories: vec![
                DataCategory::Price,
                DataCategory::Sports,
                DataCategory::Weather,
                DataCategory::Random,
                DataCategory::Stocks,
                DataCategory::Forex,
            ],
        }
    }

    fn headers(&self) -> Option<HeaderMap> {
        let key = self.api_key.as_ref()?;
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {key}")) {
            headers.insert(AUTHORIZATION, value);
        }
        Some(headers)
    }

    async fn price_feed(&self, pair: &str) -> Result<Value> {
        let url = format!("{}/price/{}", self.endpoint, pair.to_ascii_uppercase());
        let body = self.session.get_json(&url, self.headers(), None).await?;

        let price = body["price"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .or_else(|| body["price"].as_f64())
            .ok_or_else(|| OracleError::Provider {
                provider: "chainlink".into(),
                message: format!("feed {pair} returned no price"),
                status: None,
            })?;

        Ok(json!({
            "price": price,
            "pair": pair.to_ascii_uppercase(),
            "decimals": body["decimals"].as_u64().unwrap_or(8),
            "updated_at": body["updatedAt"].as_i64(),
            "round_id": body["roundId"],
        }))
    }

    async fn sports_event(&self, event: &str) -> Result<Value> {
        let url = format!("{}/sports/events/{}", self.endpoint, event);
        let body = self.session.get_json(&url, self.headers(), None).await?;
        Ok(json!({
            "event": event,
            "status": body["status"],
            "score": body["score"],
            "source": body["source"].as_str().unwrap_or("TheRundown"),
        }))
    }

    async fn weather(&self, location: &str) -> Result<Value> {
        let url = format!(
            "{}/weather?location={}",
            self.endpoint,
            urlencoding::encode(location)
        );
        let body = self.session.get_json(&url, self.headers(), None).await?;
        Ok(json!({
            "location": location,
            "temperature": body["temperature"],
            "conditions": body["conditions"],
            "source": body["source"].as_str().unwrap_or("AccuWeather"),
        }))
    }

    /// VRF fulfillment is asynchronous; this only submits the request and
    /// surfaces the request id.
    async fn vrf_request(&self, request: &OracleRequest) -> Result<Value> {
        let url = format!("{}/vrf/request", self.endpoint);
        let payload = json!({
            "subscription_id": request.parameters.get("subscription_id").cloned().unwrap_or(json!(1)),
            "num_words": request.parameters.get("num_words").cloned().unwrap_or(json!(1)),
        });
        let body = self
            .session
            .post_json(&url, &payload, self.headers(), None)
            .await?;
        Ok(json!({
            "request_id": body["request_id"],
            "status": "pending",
        }))
    }
}

#[async_trait]
impl OracleAdapter for ChainlinkAdapter {
    fn name(&self) -> &str {
        "chainlink"
    }

    fn supported_categories(&self) -> &[DataCategory] {
        &self.categories
    }

    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn fetch(&self, request: &OracleRequest) -> Result<Value> {
        match request.data_type {
            DataCategory::Price | DataCategory::Stocks | DataCategory::Forex => {
                self.price_feed(&request.query).await
            }
            DataCategory::Sports => self.sports_event(&request.query).await,
            DataCategory::Weather => self.weather(&request.query).await,
            DataCategory::Random => self.vrf_request(request).await,
            other => Err(OracleError::Unsupported(format!(
                "chainlink does not support {other} data"
            ))),
        }
    }

    async fn health_probe(&self) -> Result<Value> {
        self.price_feed("ETH/USD").await
    }

    /// Freshness-tiered: recent aggregator rounds score higher.
    fn estimate_confidence(&self, data: &Value, _request: &OracleRequest) -> f64 {
        if data.is_null() {
            return 0.0;
        }
        match data["updated_at"].as_i64() {
            Some(updated_at) => {
                let age_secs = (Utc::now().timestamp() - updated_at).max(0);
                if age_secs < 60 {
                    0.95
                } else if age_secs < 300 {
                    0.85
                } else {
                    0.75
                }
            }
            None => 0.8,
        }
    }

    fn estimate_cost(&self, _request: &OracleRequest) -> f64 {
        0.50
    }

    fn response_metadata(&self, request: &OracleRequest) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("network".into(), json!("ethereum"));
        metadata.insert("aggregation".into(), json!("median"));
        if request.data_type == DataCategory::Sports {
            metadata.insert("data_source".into(), json!("TheRundown"));
        }
        metadata
    }
}
