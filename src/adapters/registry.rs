//! Adapter registry: discovery by capability, health-ranked failover.
//!
//! The registry mutates only at startup/registration time; query-path access
//! is read-only and takes stats snapshots rather than holding adapter locks.

use super::OracleAdapter;
use crate::models::{DataCategory, OracleRequest, OracleResponse};
use crate::Result;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Sentinel provider id on the aggregate-failure response.
pub const FAILED_PROVIDER: &str = "failed";

#[derive(Default)]
pub struct AdapterRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn OracleAdapter>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, adapter: Arc<dyn OracleAdapter>) {
        let name = adapter.name().to_string();
        self.adapters
            .write()
            .expect("registry lock poisoned")
            .insert(name.clone(), adapter);
        info!(adapter = %name, "registered oracle adapter");
    }

    pub fn unregister(&self, name: &str) -> bool {
        let removed = self
            .adapters
            .write()
            .expect("registry lock poisoned")
            .remove(name)
            .is_some();
        if removed {
            info!(adapter = name, "unregistered oracle adapter");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn OracleAdapter>> {
        self.adapters
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .adapters
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// All adapters supporting `category`.
    pub fn adapters_for(&self, category: DataCategory) -> Vec<Arc<dyn OracleAdapter>> {
        self.adapters
            .read()
            .expect("registry lock poisoned")
            .values()
            .filter(|a| a.supported_categories().contains(&category))
            .cloned()
            .collect()
    }

    /// Query the best available adapter for `request`, failing over down the
    /// ranking until one succeeds.
    ///
    /// Ranking: success rate descending, then average latency ascending.
    /// The returned response's `provider` is the adapter that succeeded, or
    /// the sentinel `"failed"` with the aggregated error when all are
    /// exhausted.
    pub async fn query_best(
        &self,
        request: &OracleRequest,
        preferred: Option<&[String]>,
    ) -> Result<OracleResponse> {
        let mut candidates = self.adapters_for(request.data_type);
        if let Some(preferred) = preferred {
            if !preferred.is_empty() {
                candidates.retain(|a| preferred.iter().any(|p| p == a.name()));
            }
        }

        if candidates.is_empty() {
            return Ok(OracleResponse::failure(
                FAILED_PROVIDER,
                format!(
                    "UNSUPPORTED: no adapters available for {} data",
                    request.data_type
                ),
                0,
            ));
        }

        candidates.sort_by(|a, b| {
            let sa = a.stats_snapshot();
            let sb = b.stats_snapshot();
            sb.success_rate
                .partial_cmp(&sa.success_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    sa.avg_latency_ms
                        .partial_cmp(&sb.avg_latency_ms)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then_with(|| a.name().cmp(b.name()))
        });

        let mut last_error = None;
        for adapter in &candidates {
            match adapter.query(request).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => {
                    warn!(
                        adapter = adapter.name(),
                        error = ?response.error,
                        "adapter failed, trying next"
                    );
                    last_error = response.error;
                }
                Err(err) => {
                    warn!(adapter = adapter.name(), error = %err, "adapter rejected request");
                    last_error = Some(err.to_string());
                }
            }
        }

        Ok(OracleResponse::failure(
            FAILED_PROVIDER,
            format!(
                "all adapters failed; last error: {}",
                last_error.unwrap_or_else(|| "unknown".into())
            ),
            0,
        ))
    }
}
