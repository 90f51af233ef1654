//! Environment-driven configuration.
//!
//! Loaded once at startup (`OracleConfig::from_env`), read-only thereafter.
//! The process-wide cell supports a one-time `init`; `reload` exists for tests
//! only.

use crate::{OracleError, Result};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Per-provider adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
    pub retries: u32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            endpoint: None,
            timeout_secs: 30,
            retries: 3,
        }
    }
}

/// Main configuration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    // Core API settings
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,

    // AI routing settings
    pub enable_ai: bool,
    pub ai_model: String,
    pub openrouter_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,

    // Provider adapter settings, keyed by lowercase provider name
    pub providers: HashMap<String, ProviderSettings>,

    // On-chain RPC endpoints, keyed by lowercase chain name
    pub chain_rpc_urls: HashMap<String, String>,

    // Cache settings
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    pub cache_max_size: usize,

    // Logging
    pub log_level: String,
}

const PROVIDER_NAMES: [&str; 5] = ["chainlink", "pyth", "band", "uma", "api3"];
const CHAIN_NAMES: [&str; 6] = [
    "ethereum", "polygon", "arbitrum", "optimism", "base", "solana",
];

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_key: None,
            timeout_secs: 30,
            enable_ai: true,
            ai_model: "openai/gpt-4o-mini".to_string(),
            openrouter_api_key: None,
            openai_api_key: None,
            anthropic_api_key: None,
            providers: PROVIDER_NAMES
                .iter()
                .map(|name| (name.to_string(), ProviderSettings::default()))
                .collect(),
            chain_rpc_urls: HashMap::new(),
            cache_enabled: true,
            cache_ttl_secs: 300,
            cache_max_size: 1000,
            log_level: "info".to_string(),
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl OracleConfig {
    /// Build configuration from environment variables (loading `.env` first).
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let mut config = Self::default();
        config.base_url = env::var("ORACLE_BASE_URL").unwrap_or(config.base_url);
        config.api_key = env::var("ORACLE_API_KEY").ok();
        config.timeout_secs = env_parse("ORACLE_TIMEOUT", config.timeout_secs);
        config.enable_ai = env_bool("ORACLE_ENABLE_AI", config.enable_ai);
        config.ai_model = env::var("ORACLE_AI_MODEL").unwrap_or(config.ai_model);
        config.openrouter_api_key = env::var("OPENROUTER_API_KEY").ok();
        config.openai_api_key = env::var("OPENAI_API_KEY").ok();
        config.anthropic_api_key = env::var("ANTHROPIC_API_KEY").ok();
        config.cache_enabled = env_bool("CACHE_ENABLED", config.cache_enabled);
        config.cache_ttl_secs = env_parse("CACHE_TTL", config.cache_ttl_secs);
        config.log_level = env::var("LOG_LEVEL").unwrap_or(config.log_level);

        for name in PROVIDER_NAMES {
            let upper = name.to_ascii_uppercase();
            let settings = ProviderSettings {
                enabled: env_bool(&format!("{upper}_ENABLED"), true),
                api_key: env::var(format!("{upper}_API_KEY")).ok(),
                endpoint: env::var(format!("{upper}_ENDPOINT")).ok(),
                timeout_secs: env_parse(&format!("{upper}_TIMEOUT"), 30),
                retries: env_parse(&format!("{upper}_RETRIES"), 3),
            };
            config.providers.insert(name.to_string(), settings);
        }

        for chain in CHAIN_NAMES {
            let key = format!("{}_RPC_URL", chain.to_ascii_uppercase());
            if let Ok(url) = env::var(&key) {
                config.chain_rpc_urls.insert(chain.to_string(), url);
            }
        }

        config
    }

    pub fn provider(&self, name: &str) -> ProviderSettings {
        self.providers.get(name).cloned().unwrap_or_default()
    }

    pub fn chain_rpc_url(&self, chain: &str) -> Option<&str> {
        self.chain_rpc_urls.get(chain).map(|s| s.as_str())
    }

    /// Validate the configuration, returning every issue found.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.base_url.is_empty() {
            issues.push("base_url is empty".to_string());
        } else if url::Url::parse(&self.base_url).is_err() {
            issues.push(format!("base_url is not a valid URL: {}", self.base_url));
        }
        if self.timeout_secs == 0 {
            issues.push("timeout_secs must be positive".to_string());
        }
        if self.enable_ai
            && self.openrouter_api_key.is_none()
            && self.openai_api_key.is_none()
            && self.anthropic_api_key.is_none()
        {
            issues.push(
                "AI routing enabled but no LLM API key configured \
                 (OPENROUTER_API_KEY / OPENAI_API_KEY / ANTHROPIC_API_KEY)"
                    .to_string(),
            );
        }
        for (name, settings) in &self.providers {
            if let Some(endpoint) = &settings.endpoint {
                if url::Url::parse(endpoint).is_err() {
                    issues.push(format!("{name} endpoint is not a valid URL: {endpoint}"));
                }
            }
        }
        issues
    }
}

/// Initialize structured logging from `LOG_LEVEL` (or `RUST_LOG`, which takes
/// precedence). Safe to call more than once; later calls are no-ops.
pub fn init_logging(config: &OracleConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

lazy_static! {
    static ref GLOBAL_CONFIG: RwLock<Option<Arc<OracleConfig>>> = RwLock::new(None);
}

/// One-time process-wide initialization. Fails on invalid configuration or a
/// second call.
pub fn init(config: OracleConfig) -> Result<Arc<OracleConfig>> {
    let issues = config.validate();
    if !issues.is_empty() {
        return Err(OracleError::Configuration(issues.join("; ")));
    }
    let mut cell = GLOBAL_CONFIG.write().expect("config lock poisoned");
    if cell.is_some() {
        return Err(OracleError::Configuration(
            "global configuration already initialized".into(),
        ));
    }
    let config = Arc::new(config);
    *cell = Some(config.clone());
    info!(base_url = %config.base_url, ai = config.enable_ai, "configuration initialized");
    Ok(config)
}

/// The process-wide configuration, initializing from the environment on first
/// access.
pub fn get() -> Arc<OracleConfig> {
    {
        let cell = GLOBAL_CONFIG.read().expect("config lock poisoned");
        if let Some(config) = cell.as_ref() {
            return config.clone();
        }
    }
    let mut cell = GLOBAL_CONFIG.write().expect("config lock poisoned");
    cell.get_or_insert_with(|| Arc::new(OracleConfig::from_env()))
        .clone()
}

/// Replace the process-wide configuration. Test-only escape hatch.
pub fn reload(config: OracleConfig) -> Arc<OracleConfig> {
    let mut cell = GLOBAL_CONFIG.write().expect("config lock poisoned");
    let config = Arc::new(config);
    *cell = Some(config.clone());
    config
}
