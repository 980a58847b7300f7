//! Keyword heuristic for voice command intent and sentiment.
//!
//! Matching is case-insensitive substring search. Keyword sets are checked in
//! a fixed order and the first match wins, so a command containing both a
//! navigation and a query keyword is always classified as navigation.

use crate::domain::{Intent, Sentiment};

/// Intent keyword sets in priority order
pub const INTENT_KEYWORDS: [(Intent, &[&str]); 3] = [
    (Intent::Navigation, &["navigate", "go to", "open", "show"]),
    (Intent::Query, &["search", "find", "look for"]),
    (Intent::Control, &["stop", "cancel", "close"]),
];

/// Sentiment keyword sets in priority order
pub const SENTIMENT_KEYWORDS: [(Sentiment, &[&str]); 2] = [
    (Sentiment::Positive, &["great", "good", "awesome", "thanks"]),
    (Sentiment::Negative, &["bad", "wrong", "error", "hate"]),
];

/// Classify a command into (intent, sentiment)
pub fn classify(text: &str) -> (Intent, Sentiment) {
    let lowered = text.to_lowercase();
    (intent_of(&lowered), sentiment_of(&lowered))
}

fn intent_of(lowered: &str) -> Intent {
    INTENT_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(intent, _)| *intent)
        .unwrap_or(Intent::General)
}

fn sentiment_of(lowered: &str) -> Sentiment {
    SENTIMENT_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(sentiment, _)| *sentiment)
        .unwrap_or(Sentiment::Neutral)
}
