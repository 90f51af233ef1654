//! API3 adapter: first-party dAPIs serving signed data directly from the
//! source operator, including weather, sports, and NFT floor prices.

use super::{AdapterCore, OracleAdapter};
use crate::config::ProviderSettings;
use crate::models::{DataCategory, OracleRequest};
use crate::transport::HttpSession;
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

const DEFAULT_ENDPOINT: &str = "https://api.api3.org/v1";

pub struct Api3Adapter {
    core: AdapterCore,
    session: Arc<HttpSession>,
    endpoint: String,
    categories: Vec<DataCategory>,
}

impl Api3Adapter {
    pub fn new(session: Arc<HttpSession>, settings: &ProviderSettings) -> Self {
        Self {
            core: AdapterCore::new("api3"),
            session,
            endpoint: settings
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            categories: vec![
                DataCategory::Price,
                DataCategory::Weather,
                DataCategory::Sports,
                DataCategory::Custom,
                DataCategory::Nft,
            ],
        }
    }

    fn dapi_name(request: &OracleRequest) -> String {
        match request.data_type {
            DataCategory::Nft => format!("nft-floor/{}", request.query.to_ascii_lowercase()),
            DataCategory::Weather => format!("weather/{}", request.query.to_ascii_lowercase()),
            DataCategory::Sports => format!("sports/{}", request.query.to_ascii_lowercase()),
            _ => request.query.to_ascii_uppercase(),
        }
    }

    async fn read_dapi(&self, request: &OracleRequest) -> Result<Value> {
        let name = Self::dapi_name(request);
        let url = format!("{}/dapis/{name}", self.endpoint);
        let body = self.session.get_json(&url, None, None).await?;
        Ok(json!({
            "value": body["value"],
            "timestamp": body["timestamp"],
            "dapi": name,
            // First-party data arrives signed by the source's airnode
            "signature": body["signature"],
            "airnode": body["airnode"],
        }))
    }
}

#[async_trait]
impl OracleAdapter for Api3Adapter {
    fn name(&self) -> &str {
        "api3"
    }

    fn supported_categories(&self) -> &[DataCategory] {
        &self.categories
    }

    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn fetch(&self, request: &OracleRequest) -> Result<Value> {
        self.read_dapi(request).await
    }

    async fn health_probe(&self) -> Result<Value> {
        let url = format!("{}/dapis/ETH%2FUSD", self.endpoint);
        self.session.get_json(&url, None, None).await
    }

    /// Signed payloads from the first party score high; unsigned reads drop
    /// to a conservative tier.
    fn estimate_confidence(&self, data: &Value, _request: &OracleRequest) -> f64 {
        if data.is_null() {
            return 0.0;
        }
        if data["signature"].is_string() {
            0.92
        } else {
            0.8
        }
    }

    fn estimate_cost(&self, _request: &OracleRequest) -> f64 {
        0.25
    }

    fn response_metadata(&self, request: &OracleRequest) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("api_type".into(), json!("first_party"));
        metadata.insert("signed_data".into(), json!(true));
        if request.data_type == DataCategory::Weather {
            metadata.insert("data_source".into(), json!("direct_noaa"));
        }
        metadata
    }
}
