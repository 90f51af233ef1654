//! LLM provider clients and the priority-ordered fallback router.

use super::{ChatMessage, LlmProviderType, LlmRequest, LlmResponse, MessageRole};
use crate::{OracleError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

/// Contract every LLM provider client implements.
#[async_trait]
pub trait LlmProviderClient: Send + Sync {
    /// Send a chat completion request.
    async fn chat_completion(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Lightweight availability probe (a cheap GET against the provider).
    async fn check_availability(&self) -> bool;

    /// Get the provider type.
    fn provider_type(&self) -> LlmProviderType;
}

/// Client for OpenAI-compatible chat APIs (OpenAI itself and OpenRouter).
pub struct OpenAiCompatibleClient {
    client: Client,
    provider: LlmProviderType,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatibleClient {
    pub fn openai(api_key: String) -> Self {
        Self {
            client: Client::new(),
            provider: LlmProviderType::OpenAi,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key,
        }
    }

    pub fn openrouter(api_key: String) -> Self {
        Self {
            client: Client::new(),
            provider: LlmProviderType::OpenRouter,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key,
        }
    }

    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| OracleError::Configuration("invalid LLM API key".into()))?;
        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }

    fn convert_request(&self, request: &LlmRequest) -> Value {
        let mut payload = json!({
            "model": request.model,
            "messages": request.messages.iter().map(|msg| json!({
                "role": match msg.role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                },
                "content": msg.content,
            })).collect::<Vec<_>>(),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if request.json_response {
            payload["response_format"] = json!({ "type": "json_object" });
        }
        payload
    }
}

#[async_trait]
impl LlmProviderClient for OpenAiCompatibleClient {
    async fn chat_completion(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .headers(self.build_headers()?)
            .json(&self.convert_request(request))
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => OracleError::Authentication(error_text),
                429 => OracleError::RateLimited {
                    message: error_text,
                    retry_after_secs: None,
                },
                _ => OracleError::AiService(format!("HTTP {status}: {error_text}")),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| OracleError::AiService(format!("invalid completion body: {e}")))?;
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| OracleError::AiService("completion has no content".into()))?
            .to_string();

        Ok(LlmResponse {
            id: body["id"].as_str().unwrap_or_default().to_string(),
            model: body["model"]
                .as_str()
                .unwrap_or(&request.model)
                .to_string(),
            provider: self.provider.clone(),
            content,
            prompt_tokens: body["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: body["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        })
    }

    async fn check_availability(&self) -> bool {
        let Ok(headers) = self.build_headers() else {
            return false;
        };
        self.client
            .get(format!("{}/models", self.base_url))
            .headers(headers)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn provider_type(&self) -> LlmProviderType {
        self.provider.clone()
    }
}

/// Anthropic messages-API client.
pub struct AnthropicClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: "https://api.anthropic.com".to_string(),
            api_key,
        }
    }

    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| OracleError::Configuration("invalid Anthropic API key".into()))?;
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        Ok(headers)
    }

    /// The messages API takes the system prompt as a top-level field.
    fn convert_request(&self, request: &LlmRequest) -> Value {
        let system: Vec<&ChatMessage> = request
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .collect();
        let conversation: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|msg| {
                json!({
                    "role": match msg.role {
                        MessageRole::Assistant => "assistant",
                        _ => "user",
                    },
                    "content": msg.content,
                })
            })
            .collect();

        let mut payload = json!({
            "model": request.model,
            "messages": conversation,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        if let Some(system) = system.first() {
            payload["system"] = json!(system.content);
        }
        payload
    }
}

#[async_trait]
impl LlmProviderClient for AnthropicClient {
    async fn chat_completion(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .headers(self.build_headers()?)
            .json(&self.convert_request(request))
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => OracleError::Authentication(error_text),
                429 => OracleError::RateLimited {
                    message: error_text,
                    retry_after_secs: None,
                },
                _ => OracleError::AiService(format!("HTTP {status}: {error_text}")),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| OracleError::AiService(format!("invalid completion body: {e}")))?;
        let content = body["content"][0]["text"]
            .as_str()
            .ok_or_else(|| OracleError::AiService("completion has no content".into()))?
            .to_string();

        Ok(LlmResponse {
            id: body["id"].as_str().unwrap_or_default().to_string(),
            model: body["model"]
                .as_str()
                .unwrap_or(&request.model)
                .to_string(),
            provider: LlmProviderType::Anthropic,
            content,
            prompt_tokens: body["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: body["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
        })
    }

    async fn check_availability(&self) -> bool {
        let Ok(headers) = self.build_headers() else {
            return false;
        };
        self.client
            .get(format!("{}/v1/models", self.base_url))
            .headers(headers)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn provider_type(&self) -> LlmProviderType {
        LlmProviderType::Anthropic
    }
}

/// Priority-ordered fallback chain over the configured provider clients.
pub struct LlmRouter {
    chain: Vec<Box<dyn LlmProviderClient>>,
}

impl LlmRouter {
    /// Build the chain from whichever keys are configured, preferred provider
    /// first: OpenRouter, then OpenAI, then Anthropic.
    pub fn from_keys(
        openrouter_key: Option<String>,
        openai_key: Option<String>,
        anthropic_key: Option<String>,
    ) -> Self {
        let mut chain: Vec<Box<dyn LlmProviderClient>> = Vec::new();
        if let Some(key) = openrouter_key {
            chain.push(Box::new(OpenAiCompatibleClient::openrouter(key)));
            info!("LLM provider initialized: openrouter");
        }
        if let Some(key) = openai_key {
            chain.push(Box::new(OpenAiCompatibleClient::openai(key)));
            info!("LLM provider initialized: openai");
        }
        if let Some(key) = anthropic_key {
            chain.push(Box::new(AnthropicClient::new(key)));
            info!("LLM provider initialized: anthropic");
        }
        if chain.is_empty() {
            warn!("no LLM providers configured - AI enhancement will be skipped");
        }
        Self { chain }
    }

    #[cfg(test)]
    pub(crate) fn from_clients(chain: Vec<Box<dyn LlmProviderClient>>) -> Self {
        Self { chain }
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Try each provider in priority order: probe availability, then attempt
    /// the completion; fall through on failure. All-fail is an `AiService`
    /// error the caller recovers from.
    pub async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        if self.chain.is_empty() {
            return Err(OracleError::AiService("no LLM providers configured".into()));
        }

        let mut last_error = None;
        for client in &self.chain {
            let provider = client.provider_type();
            if !client.check_availability().await {
                warn!(provider = %provider, "LLM provider unavailable, trying next");
                last_error = Some(OracleError::AiService(format!("{provider} unavailable")));
                continue;
            }
            match client.chat_completion(request).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    warn!(provider = %provider, error = %err, "LLM completion failed, trying next");
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| OracleError::AiService("no providers in chain".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct ScriptedClient {
        provider: LlmProviderType,
        available: bool,
        response: std::result::Result<String, String>,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl LlmProviderClient for ScriptedClient {
        async fn chat_completion(&self, request: &LlmRequest) -> Result<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(content) => Ok(LlmResponse {
                    id: "test".into(),
                    model: request.model.clone(),
                    provider: self.provider.clone(),
                    content: content.clone(),
                    prompt_tokens: 10,
                    completion_tokens: 5,
                }),
                Err(message) => Err(OracleError::AiService(message.clone())),
            }
        }

        async fn check_availability(&self) -> bool {
            self.available
        }

        fn provider_type(&self) -> LlmProviderType {
            self.provider.clone()
        }
    }

    fn request() -> LlmRequest {
        LlmRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![ChatMessage::user("hello")],
            temperature: 0.2,
            max_tokens: 100,
            json_response: true,
        }
    }

    #[tokio::test]
    async fn falls_through_unavailable_providers() {
        let skipped = Arc::new(AtomicU32::new(0));
        let used = Arc::new(AtomicU32::new(0));
        let router = LlmRouter::from_clients(vec![
            Box::new(ScriptedClient {
                provider: LlmProviderType::OpenRouter,
                available: false,
                response: Ok("never".into()),
                calls: skipped.clone(),
            }),
            Box::new(ScriptedClient {
                provider: LlmProviderType::Anthropic,
                available: true,
                response: Ok("{\"ok\":true}".into()),
                calls: used.clone(),
            }),
        ]);

        let response = router.complete(&request()).await.unwrap();
        assert_eq!(response.provider, LlmProviderType::Anthropic);
        // The unavailable provider was never asked for a completion
        assert_eq!(skipped.load(Ordering::SeqCst), 0);
        assert_eq!(used.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn falls_through_failing_providers() {
        let router = LlmRouter::from_clients(vec![
            Box::new(ScriptedClient {
                provider: LlmProviderType::OpenRouter,
                available: true,
                response: Err("model overloaded".into()),
                calls: Arc::new(AtomicU32::new(0)),
            }),
            Box::new(ScriptedClient {
                provider: LlmProviderType::OpenAi,
                available: true,
                response: Ok("{\"ok\":true}".into()),
                calls: Arc::new(AtomicU32::new(0)),
            }),
        ]);

        let response = router.complete(&request()).await.unwrap();
        assert_eq!(response.provider, LlmProviderType::OpenAi);
    }

    #[tokio::test]
    async fn all_failing_surfaces_ai_service_error() {
        let router = LlmRouter::from_clients(vec![Box::new(ScriptedClient {
            provider: LlmProviderType::OpenRouter,
            available: true,
            response: Err("down".into()),
            calls: Arc::new(AtomicU32::new(0)),
        })]);
        let err = router.complete(&request()).await.unwrap_err();
        assert_eq!(err.kind(), "AI_SERVICE");

        let empty = LlmRouter::from_clients(vec![]);
        assert!(empty.complete(&request()).await.is_err());
    }

    #[test]
    fn openai_payload_includes_json_response_format() {
        let client = OpenAiCompatibleClient::openai("sk-test".into());
        let payload = client.convert_request(&request());
        assert_eq!(payload["response_format"]["type"], "json_object");
        assert_eq!(payload["messages"][0]["role"], "user");
    }

    #[test]
    fn anthropic_payload_hoists_system_prompt() {
        let client = AnthropicClient::new("key".into());
        let request = LlmRequest {
            model: "claude-3-5-haiku-latest".into(),
            messages: vec![
                ChatMessage::system("you are an oracle router"),
                ChatMessage::user("route this"),
            ],
            temperature: 0.1,
            max_tokens: 200,
            json_response: true,
        };
        let payload = client.convert_request(&request);
        assert_eq!(payload["system"], "you are an oracle router");
        assert_eq!(payload["messages"].as_array().unwrap().len(), 1);
        assert_eq!(payload["messages"][0]["role"], "user");
    }
}
