//! LLM infrastructure for routing enhancement and market resolution.
//!
//! Providers sit behind [`providers::LlmProviderClient`]; [`providers::LlmRouter`]
//! walks a priority-ordered fallback chain. The enhancement and resolution
//! services layer strict contract-schema validation on top, so an LLM can only
//! ever influence a decision through a shape the on-chain contracts accept.

pub mod enhancement;
pub mod providers;
pub mod resolution;

pub use enhancement::EnhancementService;
pub use providers::{AnthropicClient, LlmProviderClient, LlmRouter, OpenAiCompatibleClient};
pub use resolution::MarketResolver;

use serde::{Deserialize, Serialize};
use std::fmt;

/// LLM providers supported by the fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LlmProviderType {
    OpenRouter,
    OpenAi,
    Anthropic,
}

impl fmt::Display for LlmProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProviderType::OpenRouter => write!(f, "openrouter"),
            LlmProviderType::OpenAi => write!(f, "openai"),
            LlmProviderType::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Chat message roles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Completion request forwarded to whichever provider answers.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Enforce `response_format: json_object` where the provider supports it
    pub json_response: bool,
}

/// Completion response, normalized across providers.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub id: String,
    pub model: String,
    pub provider: LlmProviderType,
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}
