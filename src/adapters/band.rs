//! Band Protocol adapter: cross-chain reference data plus arbitrary
//! custom-API requests through the BandChain oracle scripts.

use super::{AdapterCore, OracleAdapter};
use crate::config::ProviderSettings;
use crate::models::{DataCategory, OracleRequest};
use crate::transport::HttpSession;
use crate::{OracleError, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

const DEFAULT_ENDPOINT: &str = "https://laozi1.bandchain.org/api";

pub struct BandAdapter {
    core: AdapterCore,
    session: Arc<HttpSession>,
    endpoint: String,
    categories: Vec<DataCategory>,
}

impl BandAdapter {
    pub fn new(session: Arc<HttpSession>, settings: &ProviderSettings) -> Self {
        Self {
            core: AdapterCore::new("band"),
            session,
            endpoint: settings
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            categories: vec![
                DataCategory::Price,
                DataCategory::Stocks,
                DataCategory::Forex,
                DataCategory::Commodities,
                DataCategory::Custom,
            ],
        }
    }

    async fn reference_data(&self, pair: &str) -> Result<Value> {
        let symbol = pair
            .split('/')
            .next()
            .unwrap_or(pair)
            .to_ascii_uppercase();
        let url = format!(
            "{}/oracle/v1/request_prices?symbols={symbol}",
            self.endpoint
        );
        let body = self.session.get_json(&url, None, None).await?;

        let entry = body["price_results"]
            .as_array()
            .and_then(|a| a.first())
            .ok_or_else(|| OracleError::Provider {
                provider: "band".into(),
                message: format!("no reference data for {symbol}"),
                status: None,
            })?;
        // px is scaled by the multiplier
        let px = entry["px"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .or_else(|| entry["px"].as_f64())
            .unwrap_or(0.0);
        let multiplier = entry["multiplier"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .or_else(|| entry["multiplier"].as_f64())
            .unwrap_or(1.0);

        Ok(json!({
            "price": if multiplier > 0.0 { px / multiplier } else { 0.0 },
            "symbol": symbol,
            "resolve_time": entry["resolve_time"],
            "request_id": entry["request_id"],
        }))
    }

    /// Band oracle scripts can call any HTTP endpoint; the request parameters
    /// carry the target URL and an optional JSON path selector.
    async fn custom_request(&self, request: &OracleRequest) -> Result<Value> {
        let url = format!("{}/oracle/v1/custom", self.endpoint);
        let payload = json!({
            "url": request.parameters.get("url").cloned().unwrap_or(json!(request.query)),
            "method": request.parameters.get("method").cloned().unwrap_or(json!("GET")),
            "selector": request.parameters.get("selector").cloned().unwrap_or(Value::Null),
            "aggregation_method": "weighted_average",
        });
        let body = self.session.post_json(&url, &payload, None, None).await?;
        Ok(json!({
            "result": body["result"],
            "request_id": body["request_id"],
            "resolve_time": body["resolve_time"],
        }))
    }
}

#[async_trait]
impl OracleAdapter for BandAdapter {
    fn name(&self) -> &str {
        "band"
    }

    fn supported_categories(&self) -> &[DataCategory] {
        &self.categories
    }

    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn fetch(&self, request: &OracleRequest) -> Result<Value> {
        match request.data_type {
            DataCategory::Custom => self.custom_request(request).await,
            _ => self.reference_data(&request.query).await,
        }
    }

    async fn health_probe(&self) -> Result<Value> {
        self.reference_data("BTC/USD").await
    }

    fn estimate_confidence(&self, data: &Value, request: &OracleRequest) -> f64 {
        if data.is_null() {
            return 0.0;
        }
        // Custom requests carry whatever the target API returned; reference
        // data is validator-aggregated and scores higher.
        if request.data_type == DataCategory::Custom {
            0.8
        } else {
            0.9
        }
    }

    fn estimate_cost(&self, _request: &OracleRequest) -> f64 {
        0.30
    }

    fn response_metadata(&self, request: &OracleRequest) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("network".into(), json!("bandchain"));
        metadata.insert(
            "request_type".into(),
            json!(if request.data_type == DataCategory::Custom {
                "custom"
            } else {
                "reference_data"
            }),
        );
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> BandAdapter {
        let session = Arc::new(HttpSession::new(std::time::Duration::from_secs(5)).unwrap());
        BandAdapter::new(session, &ProviderSettings::default())
    }

    #[test]
    fn custom_requests_are_supported() {
        let adapter = adapter();
        assert!(adapter.supported_categories().contains(&DataCategory::Custom));
        let request = OracleRequest::new("https://example.com/api", DataCategory::Custom);
        assert!(adapter.validate_request(&request).is_ok());
    }

    #[test]
    fn confidence_distinguishes_reference_from_custom() {
        let adapter = adapter();
        let data = json!({"price": 65000.0});
        let reference = OracleRequest::new("BTC/USD", DataCategory::Price);
        let custom = OracleRequest::new("https://example.com", DataCategory::Custom);
        assert_eq!(adapter.estimate_confidence(&data, &reference), 0.9);
        assert_eq!(adapter.estimate_confidence(&data, &custom), 0.8);
    }
}
