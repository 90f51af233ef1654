//! Multi-provider aggregation: fan out one canonical request to several
//! adapters, compute a consensus value, and flag discrepancies.
//!
//! Responses are collected by provider id, never by arrival order, and the
//! fan-out is bounded by a semaphore so a wide provider list cannot flood the
//! executor.

use crate::adapters::AdapterRegistry;
use crate::models::{
    AggregatedOracleData, AggregationMethod, DataCategory, OracleProvider, OracleRequest,
};
use crate::{OracleError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const DEFAULT_CONCURRENCY: usize = 8;

/// Numeric spread beyond which providers are considered in disagreement.
const DISCREPANCY_SPREAD: f64 = 0.05;

pub struct Aggregator {
    registry: Arc<AdapterRegistry>,
    semaphore: Arc<Semaphore>,
}

impl Aggregator {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self::with_concurrency(registry, DEFAULT_CONCURRENCY)
    }

    pub fn with_concurrency(registry: Arc<AdapterRegistry>, concurrency: usize) -> Self {
        Self {
            registry,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Fan out `request` to `providers` and aggregate the answers.
    ///
    /// Numeric data aggregates by median with a spread check; non-numeric
    /// data takes the most recent value. Providers that answered with an
    /// error are dropped; if none answered, the call fails with a provider
    /// error.
    pub async fn aggregate(
        &self,
        data_type: DataCategory,
        request: &OracleRequest,
        providers: &[String],
        cancel: Option<CancellationToken>,
    ) -> Result<AggregatedOracleData> {
        if providers.is_empty() {
            return Err(OracleError::Validation(
                "aggregation requires at least one provider".into(),
            ));
        }

        let cancel = cancel.unwrap_or_default();
        let mut tasks = Vec::with_capacity(providers.len());
        for name in providers {
            let adapter = self.registry.get(name);
            let semaphore = self.semaphore.clone();
            let request = request.clone();
            let cancel = cancel.clone();
            let name = name.clone();
            tasks.push(async move {
                let Some(adapter) = adapter else {
                    warn!(provider = %name, "provider not registered, skipping");
                    return (name, None);
                };
                let _permit = tokio::select! {
                    permit = semaphore.acquire_owned() => permit.expect("semaphore closed"),
                    _ = cancel.cancelled() => return (name, None),
                };
                match adapter.query_cancellable(&request, &cancel).await {
                    Ok(response) if response.is_success() => (name, Some(response)),
                    Ok(response) => {
                        warn!(provider = %name, error = ?response.error, "dropping failed response");
                        (name, None)
                    }
                    Err(err) => {
                        warn!(provider = %name, error = %err, "dropping rejected request");
                        (name, None)
                    }
                }
            });
        }

        // Keyed by provider id; completion order does not matter
        let mut responses: HashMap<String, crate::models::OracleResponse> = HashMap::new();
        for (name, response) in futures::future::join_all(tasks).await {
            if let Some(response) = response {
                responses.insert(name, response);
            }
        }

        if responses.is_empty() {
            return Err(OracleError::Provider {
                provider: "aggregator".into(),
                message: "no provider returned usable data".into(),
                status: None,
            });
        }

        let provider_tags: Vec<OracleProvider> = {
            let mut names: Vec<&String> = responses.keys().collect();
            names.sort();
            names
                .iter()
                .filter_map(|n| OracleProvider::from_str(n).ok())
                .collect()
        };
        let individual_values: HashMap<String, Value> = responses
            .iter()
            .map(|(name, r)| (name.clone(), r.data.clone().unwrap_or(Value::Null)))
            .collect();
        let latest_timestamp = responses
            .values()
            .map(|r| r.timestamp_unix_ms)
            .max()
            .unwrap_or_default();

        let numeric: Vec<(String, f64, f64)> = responses
            .iter()
            .filter_map(|(name, r)| {
                numeric_value(r.data.as_ref()).map(|v| (name.clone(), v, r.confidence))
            })
            .collect();

        let aggregated = if numeric.len() == responses.len() {
            self.aggregate_numeric(data_type, provider_tags, individual_values, numeric, latest_timestamp)
        } else {
            self.aggregate_latest(data_type, provider_tags, individual_values, &responses)
        };
        debug!(
            method = ?aggregated.aggregation_method,
            discrepancy = aggregated.discrepancy_detected,
            confidence = aggregated.confidence,
            "aggregation complete"
        );
        Ok(aggregated)
    }

    fn aggregate_numeric(
        &self,
        data_type: DataCategory,
        providers: Vec<OracleProvider>,
        individual_values: HashMap<String, Value>,
        numeric: Vec<(String, f64, f64)>,
        latest_timestamp: i64,
    ) -> AggregatedOracleData {
        let mut values: Vec<f64> = numeric.iter().map(|(_, v, _)| *v).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median_value = median(&values);

        let max = values.last().copied().unwrap_or(0.0);
        let min = values.first().copied().unwrap_or(0.0);
        let spread = if max > 0.0 { (max - min) / max } else { 0.0 };
        let discrepancy = values.len() >= 2 && spread > DISCREPANCY_SPREAD;

        let mut confidences: Vec<f64> = numeric.iter().map(|(_, _, c)| *c).collect();
        confidences.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let confidence = if discrepancy {
            // Disagreement: lowest individual confidence, penalized, and never
            // above the discrepancy ceiling
            (confidences.first().copied().unwrap_or(0.0) - 0.15).clamp(0.0, 0.8)
        } else {
            // Agreement within 1% floors confidence at 0.8; a lone numeric
            // answer has zero spread and gets the same floor
            let base = median(&confidences);
            if spread < 0.01 {
                base.max(0.8)
            } else {
                base
            }
        };

        if discrepancy {
            warn!(
                spread = format!("{:.4}", spread),
                "providers disagree beyond the discrepancy bound"
            );
        }

        AggregatedOracleData {
            data_type,
            providers,
            aggregation_method: AggregationMethod::Median,
            aggregated_value: json!(median_value),
            individual_values,
            timestamp: millis_to_datetime(latest_timestamp),
            confidence,
            discrepancy_detected: discrepancy,
        }
    }

    fn aggregate_latest(
        &self,
        data_type: DataCategory,
        providers: Vec<OracleProvider>,
        individual_values: HashMap<String, Value>,
        responses: &HashMap<String, crate::models::OracleResponse>,
    ) -> AggregatedOracleData {
        let latest = responses
            .values()
            .max_by_key(|r| r.timestamp_unix_ms)
            .expect("responses non-empty");
        AggregatedOracleData {
            data_type,
            providers,
            aggregation_method: AggregationMethod::Latest,
            aggregated_value: latest.data.clone().unwrap_or(Value::Null),
            individual_values,
            timestamp: millis_to_datetime(latest.timestamp_unix_ms),
            confidence: latest.confidence,
            discrepancy_detected: false,
        }
    }
}

/// Median of a sorted slice; even counts take the mean of the middle two.
fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Interpret a provider document as a number: either a bare number or an
/// object carrying a numeric `price`/`value`/`result` field.
fn numeric_value(data: Option<&Value>) -> Option<f64> {
    let data = data?;
    if let Some(v) = data.as_f64() {
        return Some(v);
    }
    for field in ["price", "value", "result"] {
        if let Some(v) = data.get(field).and_then(|v| v.as_f64()) {
            return Some(v);
        }
    }
    None
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::testing::MockAdapter;
    use std::time::Duration;

    fn registry_with(adapters: Vec<MockAdapter>) -> Arc<AdapterRegistry> {
        let registry = Arc::new(AdapterRegistry::new());
        for adapter in adapters {
            registry.register(Arc::new(adapter));
        }
        registry
    }

    fn price_request() -> OracleRequest {
        OracleRequest::new("BTC/USD", DataCategory::Price)
    }

    #[tokio::test]
    async fn close_prices_aggregate_to_median_without_discrepancy() {
        // Chainlink $65,000 and Pyth $65,100: spread ~0.15%
        let registry = registry_with(vec![
            MockAdapter::returning(
                "chainlink",
                vec![DataCategory::Price],
                json!({"price": 65000.0}),
            )
            .with_confidence(0.95),
            MockAdapter::returning("pyth", vec![DataCategory::Price], json!({"price": 65100.0}))
                .with_confidence(0.9),
        ]);
        let aggregator = Aggregator::new(registry);

        let result = aggregator
            .aggregate(
                DataCategory::Price,
                &price_request(),
                &["chainlink".into(), "pyth".into()],
                None,
            )
            .await
            .unwrap();

        assert_eq!(result.aggregation_method, AggregationMethod::Median);
        assert_eq!(result.aggregated_value, json!(65050.0));
        assert!(!result.discrepancy_detected);
        assert!(result.confidence >= 0.8, "confidence {}", result.confidence);
        assert_eq!(result.individual_values.len(), 2);
        assert_eq!(result.individual_values["chainlink"]["price"], 65000.0);
    }

    #[tokio::test]
    async fn wide_spread_flags_discrepancy_and_cuts_confidence() {
        // $3,000 vs $3,400: spread ~11.8%
        let registry = registry_with(vec![
            MockAdapter::returning("chainlink", vec![DataCategory::Price], json!({"price": 3000.0}))
                .with_confidence(0.95),
            MockAdapter::returning("pyth", vec![DataCategory::Price], json!({"price": 3400.0}))
                .with_confidence(0.9),
        ]);
        let aggregator = Aggregator::new(registry);

        let result = aggregator
            .aggregate(
                DataCategory::Price,
                &OracleRequest::new("ETH/USD", DataCategory::Price),
                &["chainlink".into(), "pyth".into()],
                None,
            )
            .await
            .unwrap();

        assert!(result.discrepancy_detected);
        assert!(result.confidence <= 0.7, "confidence {}", result.confidence);
        // min(0.9, 0.95) - 0.15
        assert!((result.confidence - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn single_numeric_provider_gets_agreement_floor() {
        let registry = registry_with(vec![MockAdapter::returning(
            "pyth",
            vec![DataCategory::Price],
            json!({"price": 65000.0}),
        )
        .with_confidence(0.6)]);
        let aggregator = Aggregator::new(registry);

        let result = aggregator
            .aggregate(DataCategory::Price, &price_request(), &["pyth".into()], None)
            .await
            .unwrap();

        assert_eq!(result.aggregation_method, AggregationMethod::Median);
        assert_eq!(result.aggregated_value, json!(65000.0));
        assert!(!result.discrepancy_detected);
        // Zero spread floors confidence even with one provider
        assert!((result.confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn even_count_median_averages_middle_pair() {
        let registry = registry_with(vec![
            MockAdapter::returning("a1", vec![DataCategory::Price], json!(10.0)),
            MockAdapter::returning("a2", vec![DataCategory::Price], json!(20.0)),
            MockAdapter::returning("a3", vec![DataCategory::Price], json!(30.0)),
            MockAdapter::returning("a4", vec![DataCategory::Price], json!(1000.0)),
        ]);
        let aggregator = Aggregator::new(registry);
        let result = aggregator
            .aggregate(
                DataCategory::Price,
                &price_request(),
                &["a1".into(), "a2".into(), "a3".into(), "a4".into()],
                None,
            )
            .await
            .unwrap();
        assert_eq!(result.aggregated_value, json!(25.0));
        assert!(result.discrepancy_detected);
    }

    #[tokio::test]
    async fn failed_providers_are_dropped() {
        let registry = registry_with(vec![
            MockAdapter::returning("pyth", vec![DataCategory::Price], json!({"price": 65000.0}))
                .with_confidence(0.9),
            MockAdapter::failing("band", vec![DataCategory::Price], "node down"),
        ]);
        let aggregator = Aggregator::new(registry);

        let result = aggregator
            .aggregate(
                DataCategory::Price,
                &price_request(),
                &["pyth".into(), "band".into()],
                None,
            )
            .await
            .unwrap();
        assert_eq!(result.individual_values.len(), 1);
        assert_eq!(result.aggregated_value, json!(65000.0));
    }

    #[tokio::test]
    async fn all_failed_is_a_provider_error() {
        let registry = registry_with(vec![MockAdapter::failing(
            "pyth",
            vec![DataCategory::Price],
            "down",
        )]);
        let aggregator = Aggregator::new(registry);
        let err = aggregator
            .aggregate(DataCategory::Price, &price_request(), &["pyth".into()], None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "PROVIDER");
    }

    #[tokio::test]
    async fn non_numeric_data_takes_latest() {
        let registry = registry_with(vec![
            MockAdapter::returning(
                "uma",
                vec![DataCategory::Events],
                json!({"request_id": "0xabc", "state": "proposed"}),
            )
            .with_confidence(0.97),
            // Numeric-looking value mixed with non-numeric forces latest mode
            MockAdapter::returning("band", vec![DataCategory::Events], json!({"result": "yes"}))
                .with_confidence(0.8)
                .with_delay(Duration::from_millis(20)),
        ]);
        let aggregator = Aggregator::new(registry);

        let request = OracleRequest::new("Will it happen?", DataCategory::Events);
        let result = aggregator
            .aggregate(
                DataCategory::Events,
                &request,
                &["uma".into(), "band".into()],
                None,
            )
            .await
            .unwrap();
        assert_eq!(result.aggregation_method, AggregationMethod::Latest);
        // The later response wins
        assert_eq!(result.aggregated_value, json!({"result": "yes"}));
        assert!((result.confidence - 0.8).abs() < 1e-9);
        assert!(!result.discrepancy_detected);
    }

    #[tokio::test]
    async fn cancellation_propagates_to_fanout() {
        let registry = registry_with(vec![MockAdapter::returning(
            "pyth",
            vec![DataCategory::Price],
            json!({"price": 65000.0}),
        )
        .with_delay(Duration::from_secs(5))]);
        let aggregator = Aggregator::new(registry);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = aggregator
            .aggregate(
                DataCategory::Price,
                &price_request(),
                &["pyth".into()],
                Some(cancel),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "PROVIDER");
    }

    #[tokio::test]
    async fn empty_provider_list_is_a_validation_error() {
        let registry = registry_with(vec![]);
        let aggregator = Aggregator::new(registry);
        let err = aggregator
            .aggregate(DataCategory::Price, &price_request(), &[], None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION");
    }

    #[test]
    fn median_handles_odd_and_even() {
        assert_eq!(median(&[1.0, 2.0, 3.0]), 2.0);
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_eq!(median(&[7.0]), 7.0);
        assert_eq!(median(&[]), 0.0);
    }
}
