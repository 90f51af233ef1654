//! Keyword/regex/pattern question classifier.
//!
//! Pure and deterministic: the same question always yields the same
//! classification, which in turn yields the same routing when the adapter set
//! is unchanged.

use crate::models::{
    Classification, ComparisonOp, DataCategory, MarketType, QuestionRequirements,
};
use chrono::{Datelike, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;

/// Category keyword sets, scored against the lowercased question. Multi-word
/// phrases weigh 2x single words. Declaration order breaks score ties, so the
/// table order is part of the classifier's contract.
const CATEGORY_KEYWORDS: &[(DataCategory, &[&str])] = &[
    (
        DataCategory::Price,
        &[
            "price", "cost", "value", "worth", "usd", "dollar", "euro", "btc", "eth", "bitcoin",
            "ethereum", "crypto", "market cap", "above", "below", "exceed", "reach", "trade",
            "close", "open", "hit",
        ],
    ),
    (
        DataCategory::Sports,
        &[
            "game", "match", "score", "win", "lose", "beat", "champion", "playoff", "tournament",
            "team", "player", "goal", "point", "nfl", "nba", "mlb", "super bowl", "world series",
            "finals", "mvp", "draft", "season", "touchdown", "field goal", "home run", "overtime",
            "lakers", "celtics", "warriors", "knicks", "chiefs", "cowboys", "yankees", "dodgers",
        ],
    ),
    (
        DataCategory::Weather,
        &[
            "weather", "temperature", "rain", "snow", "wind", "hurricane", "storm", "celsius",
            "fahrenheit", "forecast", "climate", "drought", "flood", "tornado", "heat wave",
        ],
    ),
    (
        DataCategory::Election,
        &[
            "election", "vote", "poll", "candidate", "president", "senate", "congress", "governor",
            "ballot", "primary", "electoral", "democrat", "republican", "caucus", "debate",
            "campaign", "swing state", "popular vote", "midterm", "runoff", "approval rating",
        ],
    ),
    (
        DataCategory::Economic,
        &[
            "gdp", "inflation", "cpi", "unemployment", "interest rate", "fed", "federal reserve",
            "economy", "recession", "growth", "jobs report", "consumer", "fomc", "powell",
            "treasury", "deficit", "debt ceiling", "stimulus", "soft landing",
        ],
    ),
    (
        DataCategory::Stocks,
        &[
            "stock", "share", "nasdaq", "nyse", "s&p", "dow", "ticker", "earnings", "ipo",
            "market close", "trading", "split", "dividend", "buyback", "merger", "bankruptcy",
        ],
    ),
    (
        DataCategory::Events,
        &[
            "happen", "occur", "announce", "release", "launch", "event", "conference", "meeting",
            "decision", "ruling", "verdict", "settlement", "resign", "appoint", "confirm",
            "tweet", "post", "product launch", "keynote", "award", "oscar", "grammy",
        ],
    ),
];

lazy_static! {
    static ref THRESHOLD_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(above|below|over|under)\s+\$?[\d,]+").unwrap(),
        Regex::new(r"exceed\s+\$?[\d,]+").unwrap(),
        Regex::new(r"hit\s+\$?[\d,]+").unwrap(),
    ];
    static ref BINARY_OUTCOME_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"will\s+(?:the\s+)?\w+\s+(?:win|beat)").unwrap(),
        Regex::new(r"will\s+\w+\s+be\s+elected").unwrap(),
        Regex::new(r"will\s+\w+\s+happen").unwrap(),
        Regex::new(r"will\s+there\s+be").unwrap(),
        Regex::new(r"will\s+\w+\s+exceed").unwrap(),
        Regex::new(r"will\s+\w+\s+reach").unwrap(),
    ];
    static ref CRYPTO_SYMBOLS: Regex = Regex::new(
        r"\b(BTC|ETH|SOL|AVAX|MATIC|BNB|LINK|ARB|OP|USDC|USDT|ADA|DOT|UNI)\b"
    )
    .unwrap();
    static ref TICKER_BEFORE_NOUN: Regex =
        Regex::new(r"\b([A-Z]{1,5})\s+(?:stock|share|price)\b").unwrap();
    static ref NUMERIC_THRESHOLD: Regex =
        Regex::new(r"\$?([\d,]+\.?\d*)\s*(k|K|thousand|m|M|million|b|B|billion)?\b").unwrap();
    static ref WITHIN_PATTERN: Regex =
        Regex::new(r"within\s+(\d+)\s+(hours?|days?|weeks?|months?)").unwrap();
    static ref END_OF_PATTERN: Regex =
        Regex::new(r"by\s+(?:the\s+)?end\s+of\s+(?:the\s+)?(day|week|month|quarter|year)").unwrap();
    static ref BY_YEAR_PATTERN: Regex =
        Regex::new(r"(?:by|before)\s+(?:the\s+end\s+of\s+)?(\d{4})").unwrap();
}

/// Company names mapped to tickers for stock questions.
const STOCK_COMPANIES: &[(&str, &str)] = &[
    ("tesla", "TSLA"),
    ("apple", "AAPL"),
    ("microsoft", "MSFT"),
    ("google", "GOOGL"),
    ("amazon", "AMZN"),
    ("netflix", "NFLX"),
    ("meta", "META"),
    ("nvidia", "NVDA"),
];

/// Index of the highest score; earlier table position wins ties, keeping the
/// classifier deterministic.
fn leading_index(scores: &[(DataCategory, u32)]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, (_, score)) in scores.iter().enumerate() {
        match best {
            None => best = Some(idx),
            Some(current) if *score > scores[current].1 => best = Some(idx),
            _ => {}
        }
    }
    best
}

#[derive(Debug, Default)]
pub struct QuestionClassifier;

impl QuestionClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a question: category, confidence in `[0, 1]`, requirements.
    ///
    /// A hint overrides the scored category and lifts confidence to at least
    /// 0.8. A question matching nothing lands in `(CUSTOM, 0.3)`.
    pub fn classify(&self, question: &str, hint: Option<DataCategory>) -> Classification {
        let (mut category, mut confidence) = self.score_categories(question);
        if let Some(hint) = hint {
            category = hint;
            confidence = confidence.max(0.8);
        }
        Classification {
            category,
            confidence,
            requirements: self.extract_requirements(question),
        }
    }

    fn score_categories(&self, question: &str) -> (DataCategory, f64) {
        let lower = question.to_lowercase();
        let mut scores: Vec<(DataCategory, u32)> = Vec::new();

        for (category, keywords) in CATEGORY_KEYWORDS {
            let mut score = 0u32;
            for keyword in *keywords {
                if lower.contains(keyword) {
                    // Multi-word phrases are stronger signals
                    score += if keyword.contains(' ') { 2 } else { 1 };
                }
            }
            if score > 0 {
                scores.push((*category, score));
            }
        }

        // A threshold pattern is near-conclusive evidence of a price question
        if THRESHOLD_PATTERNS.iter().any(|p| p.is_match(&lower)) {
            match scores.iter_mut().find(|(c, _)| *c == DataCategory::Price) {
                Some(entry) => entry.1 += 5,
                None => scores.push((DataCategory::Price, 5)),
            }
        }

        // Binary-outcome phrasing reinforces whatever already leads
        if BINARY_OUTCOME_PATTERNS.iter().any(|p| p.is_match(&lower)) {
            if let Some(leader) = leading_index(&scores) {
                scores[leader].1 += 3;
            }
        }

        match leading_index(&scores) {
            None => (DataCategory::Custom, 0.3),
            Some(idx) => {
                let (category, score) = scores[idx];
                (category, (score as f64 / 10.0).min(1.0))
            }
        }
    }

    /// Extract assets, threshold, timeframe, comparison, and market type.
    pub fn extract_requirements(&self, question: &str) -> QuestionRequirements {
        QuestionRequirements {
            assets: self.extract_assets(question),
            threshold: self.extract_threshold(question),
            comparison: self.extract_comparison(question),
            timeframe: self.extract_timeframe(question),
            market_type: self.determine_market_type(question),
        }
    }

    fn extract_assets(&self, question: &str) -> Vec<String> {
        let mut assets: Vec<String> = Vec::new();
        let mut push = |symbol: String| {
            if !assets.contains(&symbol) {
                assets.push(symbol);
            }
        };

        let upper = question.to_uppercase();
        for capture in CRYPTO_SYMBOLS.captures_iter(&upper) {
            push(capture[1].to_string());
        }

        let lower = question.to_lowercase();
        for (company, ticker) in STOCK_COMPANIES {
            if lower.contains(company) {
                push(ticker.to_string());
            }
        }

        // Bare tickers only count when followed by stock/share/price
        for capture in TICKER_BEFORE_NOUN.captures_iter(question) {
            push(capture[1].to_string());
        }

        assets
    }

    fn extract_threshold(&self, question: &str) -> Option<String> {
        let capture = NUMERIC_THRESHOLD.captures(question)?;
        let value = capture[1].replace(',', "");
        let zeros = match capture.get(2).map(|m| m.as_str().to_lowercase()) {
            Some(s) if s == "k" || s == "thousand" => 3,
            Some(s) if s == "m" || s == "million" => 6,
            Some(s) if s == "b" || s == "billion" => 9,
            _ => 0,
        };
        if zeros == 0 {
            return Some(value);
        }
        if value.contains('.') {
            // Fractional value with a suffix: expand numerically
            let parsed: f64 = value.parse().ok()?;
            let expanded = parsed * 10f64.powi(zeros);
            if expanded.fract() == 0.0 {
                Some(format!("{}", expanded as i64))
            } else {
                Some(format!("{expanded}"))
            }
        } else {
            Some(format!("{value}{}", "0".repeat(zeros as usize)))
        }
    }

    fn extract_timeframe(&self, question: &str) -> Option<Duration> {
        let lower = question.to_lowercase();

        if let Some(capture) = END_OF_PATTERN.captures(&lower) {
            let days = match &capture[1] {
                "day" => 1,
                "week" => 7,
                "month" => 30,
                "quarter" => 90,
                _ => 365,
            };
            return Some(Duration::from_secs(days * 86_400));
        }

        if let Some(capture) = WITHIN_PATTERN.captures(&lower) {
            let amount: u64 = capture[1].parse().ok()?;
            let unit_secs = match capture[2].chars().next() {
                Some('h') => 3_600,
                Some('d') => 86_400,
                Some('w') => 7 * 86_400,
                _ => 30 * 86_400,
            };
            return Some(Duration::from_secs(amount * unit_secs));
        }

        if let Some(capture) = BY_YEAR_PATTERN.captures(&lower) {
            let target: i32 = capture[1].parse().ok()?;
            let current = Utc::now().year();
            if target > current {
                return Some(Duration::from_secs(
                    (target - current) as u64 * 365 * 86_400,
                ));
            }
        }

        None
    }

    fn extract_comparison(&self, question: &str) -> Option<ComparisonOp> {
        let lower = question.to_lowercase();
        if ["above", "exceed", "over", "hit", "reach", "greater", "higher"]
            .iter()
            .any(|w| lower.contains(w))
        {
            Some(ComparisonOp::GreaterThan)
        } else if ["below", "under", "less", "lower"].iter().any(|w| lower.contains(w)) {
            Some(ComparisonOp::LessThan)
        } else if ["between", "range"].iter().any(|w| lower.contains(w)) {
            Some(ComparisonOp::Range)
        } else if ["equal", "exactly"].iter().any(|w| lower.contains(w)) {
            Some(ComparisonOp::Equal)
        } else {
            None
        }
    }

    fn determine_market_type(&self, question: &str) -> MarketType {
        let lower = question.to_lowercase();
        // Priority order matters: a yes/no opener wins even when categorical
        // or scalar phrasing appears later in the sentence
        let trimmed = lower.trim_start();
        if ["will ", "can ", "does ", "is "]
            .iter()
            .any(|p| trimmed.starts_with(p))
        {
            return MarketType::Binary;
        }
        if ["who will", "which ", "what will"].iter().any(|p| lower.contains(p)) {
            return MarketType::Categorical;
        }
        if ["how many", "how much", "what price"].iter().any(|p| lower.contains(p)) {
            return MarketType::Scalar;
        }
        MarketType::Binary
    }

    /// Complexity in `[0, 1]`, used by the enhancement gate.
    pub fn complexity_score(&self, question: &str) -> f64 {
        let lower = question.to_lowercase();
        let mut complexity = 0.0;

        let words = question.split_whitespace().count() as f64;
        complexity += (words / 50.0).min(0.3);

        if lower.contains(" and ") || lower.contains(" or ") {
            complexity += 0.2;
        }
        if self.extract_timeframe(question).is_some() {
            complexity += 0.1;
        }
        if self.extract_threshold(question).is_some() {
            complexity += 0.1;
        }
        if self.extract_assets(question).len() >= 2 {
            complexity += 0.2;
        }

        complexity.min(1.0)
    }
}
