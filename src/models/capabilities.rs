//! Oracle provider identities and their static capability profiles.
//!
//! The capability table is loaded once at startup and read-only thereafter;
//! the routing engine and registry only ever take shared references to it.

use super::question::DataCategory;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Closed set of supported oracle networks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum OracleProvider {
    Chainlink,
    Pyth,
    Band,
    Uma,
    Api3,
}

impl OracleProvider {
    pub const ALL: [OracleProvider; 5] = [
        OracleProvider::Chainlink,
        OracleProvider::Pyth,
        OracleProvider::Band,
        OracleProvider::Uma,
        OracleProvider::Api3,
    ];

    /// Internal lowercase spelling, also the adapter registry key.
    pub fn as_str(&self) -> &'static str {
        match self {
            OracleProvider::Chainlink => "chainlink",
            OracleProvider::Pyth => "pyth",
            OracleProvider::Band => "band",
            OracleProvider::Uma => "uma",
            OracleProvider::Api3 => "api3",
        }
    }

    /// Uppercase spelling used in contract-compatible outputs.
    pub fn as_contract_str(&self) -> &'static str {
        match self {
            OracleProvider::Chainlink => "CHAINLINK",
            OracleProvider::Pyth => "PYTH",
            OracleProvider::Band => "BAND",
            OracleProvider::Uma => "UMA",
            OracleProvider::Api3 => "API3",
        }
    }
}

impl fmt::Display for OracleProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OracleProvider {
    type Err = String;

    /// Accepts both the internal lowercase and the contract uppercase spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chainlink" => Ok(OracleProvider::Chainlink),
            "pyth" => Ok(OracleProvider::Pyth),
            "band" => Ok(OracleProvider::Band),
            "uma" => Ok(OracleProvider::Uma),
            "api3" => Ok(OracleProvider::Api3),
            other => Err(format!("unknown oracle provider: {other}")),
        }
    }
}

/// How often a provider publishes fresh data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateFrequency {
    Realtime,
    HighFreq,
    MediumFreq,
    LowFreq,
    Hourly,
    Daily,
    OnDemand,
}

/// How a provider finalizes an answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    Direct,
    Aggregated,
    DirectPull,
    #[serde(alias = "optimistic")]
    OptimisticHumanVerified,
    CrossChainAggregated,
    FirstPartySigned,
    AiDetermined,
}

/// Static capability profile for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub categories: Vec<DataCategory>,
    pub update_frequency: UpdateFrequency,
    pub supported_chains: Vec<String>,
    pub latency_ms: u64,
    /// Observed fraction of successful resolutions, in `[0, 1]`
    pub reliability: f64,
    pub cost_usd: f64,
    /// Category name -> named data sources the provider is notably good at
    pub specialties: HashMap<String, Vec<String>>,
}

impl ProviderCapabilities {
    pub fn supports(&self, category: DataCategory) -> bool {
        self.categories.contains(&category)
    }

    pub fn has_specialty(&self, category: DataCategory) -> bool {
        self.specialties.contains_key(category.as_str())
    }
}

fn specialties(entries: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
        .collect()
}

fn chains(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// The canonical capability matrix, one entry per provider.
pub fn default_capabilities() -> HashMap<OracleProvider, ProviderCapabilities> {
    use DataCategory::*;

    let mut table = HashMap::new();

    table.insert(
        OracleProvider::Chainlink,
        ProviderCapabilities {
            categories: vec![Price, Sports, Weather, Random, Stocks, Forex],
            update_frequency: UpdateFrequency::HighFreq,
            supported_chains: chains(&[
                "ethereum",
                "polygon",
                "arbitrum",
                "optimism",
                "avalanche",
                "bnb",
            ]),
            latency_ms: 500,
            reliability: 0.99,
            cost_usd: 0.50,
            specialties: specialties(&[
                ("sports", &["TheRundown", "SportsdataIO"]),
                ("weather", &["AccuWeather", "OpenWeather"]),
                ("stocks", &["Tiingo", "AlphaVantage"]),
            ]),
        },
    );

    table.insert(
        OracleProvider::Pyth,
        ProviderCapabilities {
            categories: vec![Price, Stocks, Forex, Commodities],
            update_frequency: UpdateFrequency::Realtime,
            supported_chains: chains(&["solana", "ethereum", "arbitrum", "optimism", "base"]),
            latency_ms: 100,
            reliability: 0.98,
            cost_usd: 0.10,
            specialties: specialties(&[
                ("crypto", &["real_time_feeds"]),
                ("stocks", &["NYSE", "NASDAQ"]),
                ("forex", &["major_pairs"]),
            ]),
        },
    );

    table.insert(
        OracleProvider::Band,
        ProviderCapabilities {
            categories: vec![Price, Stocks, Forex, Commodities, Custom],
            update_frequency: UpdateFrequency::MediumFreq,
            supported_chains: chains(&["cosmos", "ethereum", "binance", "polygon"]),
            latency_ms: 1000,
            reliability: 0.95,
            cost_usd: 0.30,
            specialties: specialties(&[
                ("custom", &["any_api_endpoint"]),
                ("cross_chain", &["cosmos_ecosystem"]),
            ]),
        },
    );

    table.insert(
        OracleProvider::Uma,
        ProviderCapabilities {
            categories: vec![Custom, Events, Economic, Election],
            update_frequency: UpdateFrequency::OnDemand,
            supported_chains: chains(&["ethereum", "polygon", "arbitrum"]),
            // Full optimistic-oracle liveness window
            latency_ms: 7_200_000,
            reliability: 0.97,
            // Includes the proposer bond
            cost_usd: 100.00,
            specialties: specialties(&[
                ("election", &["human_verified"]),
                ("events", &["dispute_resolution"]),
                ("economic", &["fed_decisions"]),
            ]),
        },
    );

    table.insert(
        OracleProvider::Api3,
        ProviderCapabilities {
            categories: vec![Price, Weather, Sports, Custom, Nft],
            update_frequency: UpdateFrequency::MediumFreq,
            supported_chains: chains(&["ethereum", "polygon", "avalanche", "bnb", "arbitrum"]),
            latency_ms: 800,
            reliability: 0.96,
            cost_usd: 0.25,
            specialties: specialties(&[
                ("weather", &["direct_noaa"]),
                ("nft", &["opensea_floor", "blur_floor"]),
            ]),
        },
    );

    table
}

/// Resolution method for each provider's finalization path.
pub fn resolution_method_for(provider: OracleProvider) -> ResolutionMethod {
    match provider {
        OracleProvider::Chainlink => ResolutionMethod::Aggregated,
        OracleProvider::Pyth => ResolutionMethod::DirectPull,
        OracleProvider::Band => ResolutionMethod::CrossChainAggregated,
        OracleProvider::Uma => ResolutionMethod::OptimisticHumanVerified,
        OracleProvider::Api3 => ResolutionMethod::FirstPartySigned,
    }
}
