use crate::config::MatcherKind;
use crate::domain::recommendation::Recommendation;
use regex::Regex;
use std::sync::Arc;

/// Maps free text to a recommendation label. Implementations must be total.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn classify(&self, text: &str) -> Recommendation;
}

/// Substring scan of the lower-cased text in priority order buy, sell, hold.
/// "rebuy" counts as buy and "holdout" as hold. Nothing found means hold.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordScan;

impl Classifier for KeywordScan {
    fn name(&self) -> &'static str {
        "substring"
    }

    fn classify(&self, text: &str) -> Recommendation {
        let lower = text.to_lowercase();
        Recommendation::PRIORITY
            .into_iter()
            .find(|label| lower.contains(label.as_str()))
            .unwrap_or(Recommendation::Hold)
    }
}

/// Like [`KeywordScan`] but only whole words count.
#[derive(Debug, Clone)]
pub struct WordBoundaryScan {
    pattern: Regex,
}

impl WordBoundaryScan {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r"\b(buy|sell|hold)\b").expect("static pattern compiles"),
        }
    }
}

impl Default for WordBoundaryScan {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier for WordBoundaryScan {
    fn name(&self) -> &'static str {
        "word"
    }

    fn classify(&self, text: &str) -> Recommendation {
        let lower = text.to_lowercase();
        let found: Vec<&str> = self
            .pattern
            .find_iter(&lower)
            .map(|m| m.as_str())
            .collect();
        Recommendation::PRIORITY
            .into_iter()
            .find(|label| found.contains(&label.as_str()))
            .unwrap_or(Recommendation::Hold)
    }
}

/// Two-way rule used for the market-wide action: "positive" anywhere means buy,
/// anything else means sell. It never yields hold.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentimentSplit;

impl Classifier for SentimentSplit {
    fn name(&self) -> &'static str {
        "sentiment"
    }

    fn classify(&self, text: &str) -> Recommendation {
        if text.to_lowercase().contains("positive") {
            Recommendation::Buy
        } else {
            Recommendation::Sell
        }
    }
}

pub fn classifier_for(kind: MatcherKind) -> Arc<dyn Classifier> {
    match kind {
        MatcherKind::Substring => Arc::new(KeywordScan),
        MatcherKind::WordBoundary => Arc::new(WordBoundaryScan::new()),
    }
}
