// Test doubles for adapter-facing components. No network access: responses
// are scripted per instance.

use super::{AdapterCore, OracleAdapter};
use crate::models::{DataCategory, OracleRequest};
use crate::{OracleError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

/// Scripted adapter: returns a fixed value (or error) for every query.
pub struct MockAdapter {
    name: String,
    core: AdapterCore,
    categories: Vec<DataCategory>,
    response: Mutex<Result<Value>>,
    confidence: f64,
    delay: Option<Duration>,
}

impl MockAdapter {
    pub fn returning(name: &str, categories: Vec<DataCategory>, value: Value) -> Self {
        Self {
            name: name.to_string(),
            core: AdapterCore::new(name),
            categories,
            response: Mutex::new(Ok(value)),
            confidence: 0.95,
            delay: None,
        }
    }

    pub fn failing(name: &str, categories: Vec<DataCategory>, message: &str) -> Self {
        Self {
            name: name.to_string(),
            core: AdapterCore::new(name),
            categories,
            response: Mutex::new(Err(OracleError::Provider {
                provider: name.to_string(),
                message: message.to_string(),
                status: Some(500),
            })),
            confidence: 0.0,
            delay: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_response(&self, response: Result<Value>) {
        *self.response.lock().unwrap() = response;
    }

    fn scripted(&self) -> Result<Value> {
        match &*self.response.lock().unwrap() {
            Ok(value) => Ok(value.clone()),
            Err(OracleError::Provider {
                provider,
                message,
                status,
            }) => Err(OracleError::Provider {
                provider: provider.clone(),
                message: message.clone(),
                status: *status,
            }),
            Err(other) => Err(OracleError::Internal(anyhow::anyhow!("{other}"))),
        }
    }
}

#[async_trait]
impl OracleAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_categories(&self) -> &[DataCategory] {
        &self.categories
    }

    fn core(&self) -> &AdapterCore {
        &self.core
    }

    async fn fetch(&self, _request: &OracleRequest) -> Result<Value> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.scripted()
    }

    async fn health_probe(&self) -> Result<Value> {
        self.scripted()
    }

    fn estimate_confidence(&self, data: &Value, _request: &OracleRequest) -> f64 {
        if data.is_null() {
            0.0
        } else {
            self.confidence
        }
    }
}
