//! Backend outputs.
//!
//! A successful backend invocation produces a [`Payload`]; the orchestrator
//! wraps it in a [`RawResult`] tagged with the producing backend and the
//! failures recorded before it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::task::TaskType;

/// Text extracted from a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedText {
    pub text: String,

    /// Number of pages, when the backend can tell
    #[serde(default)]
    pub pages: Option<u32>,

    /// Table rows, when the backend extracts tables
    #[serde(default)]
    pub tables: Vec<Vec<Vec<String>>>,
}

impl ExtractedText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            pages: None,
            tables: Vec::new(),
        }
    }

    pub fn with_pages(mut self, pages: u32) -> Self {
        self.pages = Some(pages);
        self
    }
}

/// Output of a speech-to-text backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub language: String,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

/// Synthesized audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// What a backend hands back on success
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(ExtractedText),
    Transcript(Transcript),
    Audio(AudioClip),
    Vector(Vec<f32>),
}

impl Payload {
    /// Whether the primary payload is unusable.
    ///
    /// Whitespace-only text counts as empty, so a backend that "succeeds"
    /// without producing anything is treated as a failed attempt.
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Text(extracted) => extracted.text.trim().is_empty(),
            Payload::Transcript(transcript) => transcript.text.trim().is_empty(),
            Payload::Audio(clip) => clip.bytes.is_empty(),
            Payload::Vector(vector) => vector.is_empty(),
        }
    }

    /// The task type whose backends produce this payload shape
    pub fn task(&self) -> TaskType {
        match self {
            Payload::Text(_) => TaskType::PdfText,
            Payload::Transcript(_) => TaskType::SpeechToText,
            Payload::Audio(_) => TaskType::TextToSpeech,
            Payload::Vector(_) => TaskType::Embedding,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Transcript(_) => "transcript",
            Payload::Audio(_) => "audio",
            Payload::Vector(_) => "vector",
        }
    }
}

/// Why a single backend attempt did not produce a usable result
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AttemptFailure {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("invocation failed: {0}")]
    InvocationFailed(String),

    #[error("timed out after {0}ms")]
    TimedOut(u64),

    #[error("backend returned an empty result")]
    EmptyResult,

    #[error("backend returned a {actual} payload for a {expected} task")]
    WrongPayload { expected: TaskType, actual: String },
}

/// One recorded failure in the orchestrator's attempt log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAttempt {
    pub backend: String,
    pub reason: AttemptFailure,
}

/// A usable backend result
#[derive(Debug, Clone)]
pub struct RawResult {
    pub payload: Payload,

    /// Name of the backend that produced the payload
    pub backend: String,

    /// Failures recorded before the producing backend, in attempt order
    pub failures: Vec<FailedAttempt>,
}

impl RawResult {
    pub fn into_text(self) -> Option<ExtractedText> {
        match self.payload {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn into_transcript(self) -> Option<Transcript> {
        match self.payload {
            Payload::Transcript(transcript) => Some(transcript),
            _ => None,
        }
    }

    pub fn into_audio(self) -> Option<AudioClip> {
        match self.payload {
            Payload::Audio(clip) => Some(clip),
            _ => None,
        }
    }

    pub fn into_vector(self) -> Option<Vec<f32>> {
        match self.payload {
            Payload::Vector(vector) => Some(vector),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payloads() {
        assert!(Payload::Text(ExtractedText::new("  \n\t")).is_empty());
        assert!(Payload::Vector(Vec::new()).is_empty());
        assert!(Payload::Audio(AudioClip {
            bytes: Vec::new(),
            mime_type: "audio/wav".to_string()
        })
        .is_empty());
        assert!(!Payload::Text(ExtractedText::new("page one")).is_empty());
    }

    #[test]
    fn test_attempt_failure_serialization() {
        let attempt = FailedAttempt {
            backend: "tika".to_string(),
            reason: AttemptFailure::TimedOut(30_000),
        };
        let json = serde_json::to_value(&attempt).unwrap();
        assert_eq!(json["reason"]["kind"], "timed_out");
        assert_eq!(json["reason"]["detail"], 30_000);
    }
}
