//! Persisted records.
//!
//! Every record here is written once and never mutated afterwards, except
//! [`LearnedPattern`] whose counter only grows.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse intent of a voice command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Navigation,
    Query,
    Control,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Navigation => "navigation",
            Intent::Query => "query",
            Intent::Control => "control",
            Intent::General => "general",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "navigation" => Ok(Intent::Navigation),
            "query" => Ok(Intent::Query),
            "control" => Ok(Intent::Control),
            "general" => Ok(Intent::General),
            other => Err(format!("unknown intent: {}", other)),
        }
    }
}

/// Coarse sentiment of a voice command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(Sentiment::Positive),
            "negative" => Ok(Sentiment::Negative),
            "neutral" => Ok(Sentiment::Neutral),
            other => Err(format!("unknown sentiment: {}", other)),
        }
    }
}

/// A document produced by PDF ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,

    /// Where the document came from (usually a file path)
    pub source_file: String,

    /// Source kind, e.g. "pdf"
    pub source_type: String,

    /// Extracted content, capped at the configured length
    pub content: String,

    /// Name of the backend that extracted the content
    pub parsed_by: String,

    pub page_count: Option<u32>,
    pub table_count: usize,

    /// Whether `content` was cut at the cap
    pub truncated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    pub created_at: DateTime<Utc>,
}

/// Fields needed to insert a [`Document`]
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub source_file: String,
    pub source_type: String,
    pub content: String,
    pub parsed_by: String,
    pub page_count: Option<u32>,
    pub table_count: usize,
    pub truncated: bool,
}

/// One processed voice interaction (the append-only ledger)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_type: String,
    pub raw_transcript: String,
    pub intent: Intent,
    pub sentiment: Sentiment,
    pub page_route: String,
    pub created_at: DateTime<Utc>,
}

/// A classified voice command, optionally embedded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedCommand {
    pub raw_text: String,
    pub intent: Intent,
    pub sentiment: Sentiment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub page_context: String,
}

/// Recurrence counter for a normalized command text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub pattern_text: String,
    pub pattern_type: String,
    pub occurrence_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}
