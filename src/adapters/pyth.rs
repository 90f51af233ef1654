//! Pyth Network adapter: sub-second pull-based price feeds published as
//! `(price, conf, expo)` triples via the Hermes API.

use super::{AdapterCore, OracleAdapter};
use crate::config::ProviderSettings;
use crate::models::{DataCategory, OracleRequest};
use crate::transport::HttpSession;
use crate::{OracleError, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

const DEFAULT_ENDPOINT: &str = "https://hermes.pyth.network";

/// Hermes price feed ids for the majors.
fn feed_id_for(pair: &str) -> Option<&'static str> {
    match pair.to_ascii_uppercase().as_str() {
        "BTC/USD" | "BTC" => {
            Some("0xe62df6c8b4a85fe1a67db44dc12de5db330f7ac66b72dc658afedf0f4a415b43")
        }
        "ETH/USD" | "ETH" => {
            Some("0xff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace")
        }
        "SOL/USD" | "SOL" => {
            Some("0xef0d8b6fda2ceba41da15d4095d1da392a0d2f8ed0c6c7bc0f4cfac8c280b56d")
        }
        _ => None,
    }
}

pub struct PythAdapter {
    core: AdapterCore,
    session: Arc<HttpSession>,
    endpoint: String,
    categories: Vec<DataCategory>,
}

impl PythAdapter {
    pub fn new(session: Arc<HttpSession>, settings: &ProviderSettings) -> Self {
        Self {
            core: AdapterCore::new("pyth"),
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
            ],
        }
    }

    async fn price_feed(&self, pair: &str) -> Result<Value> {
        let feed_id = feed_id_for(pair).ok_or_else(|| OracleError::Provider {
            provider: "pyth".into(),
            message: format!("no hermes feed for {pair}"),
            status: None,
        })?;

        let url = format!(
            "{}/v2/updates/price/latest?ids[]={feed_id}",
            self.endpoint
        );
        let body = self.session.get_json(&url, None, None).await?;

        let parsed = body["parsed"]
            .as_array()
            .and_then(|a| a.first())
            .ok_or_else(|| OracleError::Provider {
                provider: "pyth".into(),
                message: format!("no price data for {pair}"),
                status: None,
            })?;
        let price_info = &parsed["price"];
        let raw_price = price_info["price"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .or_else(|| price_info["price"].as_f64())
            .unwrap_or(0.0);
        let raw_conf = price_info["conf"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .or_else(|| price_info["conf"].as_f64())
            .unwrap_or(0.0);
        let expo = price_info["expo"].as_i64().unwrap_or(0) as i32;
        let scale = 10f64.powi(expo);

        Ok(json!({
            // The real price is price * 10^expo
            "price": raw_price * scale,
            "conf": raw_conf * scale,
            "expo": expo,
            "raw_price": raw_price,
            "raw_conf": raw_conf,
            "publish_time": parsed["publish_time"],
            "pair": pair.to_ascii_uppercase(),
            "feed_id": feed_id,
        }))
    }
}

#[async_trait]
impl OracleAdapter for PythAdapter {
    fn name(&self) -> &str {
        "pyth"
    }

    fn supported_categories(&self) -> &[DataCategory] {
        &self.categories
    }

    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn fetch(&self, request: &OracleRequest) -> Result<Value> {
        self.price_feed(&request.query).await
    }

    async fn health_probe(&self) -> Result<Value> {
        self.price_feed("BTC/USD").await
    }

    /// `1 - conf/price` when the price is positive, else 0. The ratio is
    /// scale-invariant, so raw and scaled figures give the same answer.
    fn estimate_confidence(&self, data: &Value, _request: &OracleRequest) -> f64 {
        if data.is_null() {
            return 0.0;
        }
        let price = data["price"].as_f64().unwrap_or(0.0);
        let conf = data["conf"].as_f64().unwrap_or(0.0);
        if price > 0.0 {
            (1.0 - conf / price).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    fn estimate_cost(&self, _request: &OracleRequest) -> f64 {
        0.10
    }

    fn response_metadata(&self, request: &OracleRequest) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("data_source".into(), json!("pyth-hermes"));
        metadata.insert("update_type".into(), json!("pull_based"));
        metadata.insert("confidence_interval".into(), json!(true));
        if let Some(feed_id) = feed_id_for(&request.query) {
            metadata.insert("feed_id".into(), json!(feed_id));
        }
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> PythAdapter {
        let session = Arc::new(HttpSession::new(std::time::Duration::from_secs(5)).unwrap());
        PythAdapter::new(session, &ProviderSettings::default())
    }

    #[test]
    fn confidence_is_inverse_of_interval_ratio() {
        let adapter = adapter();
        let request = OracleRequest::new("BTC/USD", DataCategory::Price);

        let tight = json!({"price": 65000.0, "conf": 32.5});
        let conf = adapter.estimate_confidence(&tight, &request);
        assert!((conf - (1.0 - 32.5 / 65000.0)).abs() < 1e-9);

        let wide = json!({"price": 100.0, "conf": 50.0});
        assert!((adapter.estimate_confidence(&wide, &request) - 0.5).abs() < 1e-9);

        let zero_price = json!({"price": 0.0, "conf": 1.0});
        assert_eq!(adapter.estimate_confidence(&zero_price, &request), 0.0);
        assert_eq!(adapter.estimate_confidence(&Value::Null, &request), 0.0);
    }

    #[test]
    fn feed_ids_cover_major_pairs() {
        assert!(feed_id_for("BTC/USD").is_some());
        assert!(feed_id_for("eth").is_some());
        assert!(feed_id_for("DOGE/USD").is_none());
    }

    #[test]
    fn metadata_includes_feed_id() {
        let adapter = adapter();
        let request = OracleRequest::new("BTC/USD", DataCategory::Price);
        let metadata = adapter.response_metadata(&request);
        assert_eq!(metadata["update_type"], json!("pull_based"));
        assert!(metadata.contains_key("feed_id"));
    }
}
