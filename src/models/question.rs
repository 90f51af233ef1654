//! Question-level types: data categories and the requirements extracted from
//! prediction-market prose by the classifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Closed set of data categories a question can resolve against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum DataCategory {
    Price,
    Sports,
    Weather,
    Election,
    Economic,
    Random,
    Custom,
    Events,
    Stocks,
    Forex,
    Commodities,
    Nft,
}

impl DataCategory {
    /// Lowercase wire form, also used as the specialty key in capability tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataCategory::Price => "price",
            DataCategory::Sports => "sports",
            DataCategory::Weather => "weather",
            DataCategory::Election => "election",
            DataCategory::Economic => "economic",
            DataCategory::Random => "random",
            DataCategory::Custom => "custom",
            DataCategory::Events => "events",
            DataCategory::Stocks => "stocks",
            DataCategory::Forex => "forex",
            DataCategory::Commodities => "commodities",
            DataCategory::Nft => "nft",
        }
    }
}

impl fmt::Display for DataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DataCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "price" => Ok(DataCategory::Price),
            "sports" => Ok(DataCategory::Sports),
            "weather" => Ok(DataCategory::Weather),
            "election" => Ok(DataCategory::Election),
            "economic" => Ok(DataCategory::Economic),
            "random" => Ok(DataCategory::Random),
            "custom" => Ok(DataCategory::Custom),
            "events" => Ok(DataCategory::Events),
            "stocks" => Ok(DataCategory::Stocks),
            "forex" => Ok(DataCategory::Forex),
            "commodities" => Ok(DataCategory::Commodities),
            "nft" => Ok(DataCategory::Nft),
            other => Err(format!("unknown data category: {other}")),
        }
    }
}

/// Comparison operator extracted from threshold questions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    GreaterThan,
    LessThan,
    Equal,
    Range,
}

/// Prediction-market structure implied by the question phrasing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    /// Yes/no outcome ("Will X happen?")
    Binary,
    /// One of several named outcomes ("Who will win?")
    Categorical,
    /// Numeric outcome ("How many...?", "What price...?")
    Scalar,
}

/// Data requirements extracted from a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionRequirements {
    /// Asset symbols referenced by the question (e.g. `BTC`, `TSLA`)
    pub assets: Vec<String>,
    /// Numeric threshold preserved as a decimal string (suffixes expanded)
    pub threshold: Option<String>,
    pub comparison: Option<ComparisonOp>,
    /// Resolution window implied by the question, when one is stated
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "duration_secs_opt"
    )]
    pub timeframe: Option<Duration>,
    pub market_type: MarketType,
}

impl Default for QuestionRequirements {
    fn default() -> Self {
        Self {
            assets: Vec::new(),
            threshold: None,
            comparison: None,
            timeframe: None,
            market_type: MarketType::Binary,
        }
    }
}

/// Classifier output: category, confidence in `[0, 1]`, and extracted
/// requirements.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub category: DataCategory,
    pub confidence: f64,
    pub requirements: QuestionRequirements,
}

/// Serde adapter storing an optional `Duration` as whole seconds.
mod duration_secs_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let secs: Option<u64> = Option::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
