//! Task types and extraction requests.
//!
//! An [`ExtractionRequest`] is created per call and never mutated. It names the
//! task to perform and carries the raw source the backends work on.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The kind of work a backend can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Extract text (and tables) from a PDF document
    PdfText,

    /// Transcribe spoken audio
    SpeechToText,

    /// Synthesize speech audio from text
    TextToSpeech,

    /// Produce an embedding vector for text
    Embedding,
}

impl TaskType {
    /// All task types, in display order
    pub const ALL: [TaskType; 4] = [
        TaskType::PdfText,
        TaskType::SpeechToText,
        TaskType::TextToSpeech,
        TaskType::Embedding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::PdfText => "pdf_text",
            TaskType::SpeechToText => "speech_to_text",
            TaskType::TextToSpeech => "text_to_speech",
            TaskType::Embedding => "embedding",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown task type: {}", s))
    }
}

/// Raw input handed to a backend
#[derive(Debug, Clone)]
pub enum Source {
    /// A file on the local filesystem
    Path(PathBuf),

    /// In-memory bytes (e.g. an uploaded audio clip)
    Bytes { data: Vec<u8>, mime_type: String },

    /// Plain text (embedding and speech synthesis)
    Text(String),
}

impl Source {
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Source::Path(path) => Some(path),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Source::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Size of the source in bytes (0 for paths, which are checked on disk)
    pub fn len(&self) -> usize {
        match self {
            Source::Path(_) => 0,
            Source::Bytes { data, .. } => data.len(),
            Source::Text(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Source::Path(path) => path.as_os_str().is_empty(),
            Source::Bytes { data, .. } => data.is_empty(),
            Source::Text(text) => text.trim().is_empty(),
        }
    }

    /// Short description used in logs (never the content itself)
    pub fn describe(&self) -> String {
        match self {
            Source::Path(path) => path.display().to_string(),
            Source::Bytes { data, mime_type } => format!("{} bytes of {}", data.len(), mime_type),
            Source::Text(text) => format!("{} chars of text", text.chars().count()),
        }
    }
}

/// Per-request options understood by some backends
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Voice name for speech synthesis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// Language hint (ISO 639-1) for transcription
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// A single unit of work for the orchestrator
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub task: TaskType,
    pub source: Source,
    pub options: RequestOptions,
}

impl ExtractionRequest {
    pub fn new(task: TaskType, source: Source) -> Self {
        Self {
            task,
            source,
            options: RequestOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Extract text from the PDF at `path`
    pub fn pdf(path: impl Into<PathBuf>) -> Self {
        Self::new(TaskType::PdfText, Source::Path(path.into()))
    }

    /// Transcribe an in-memory audio clip
    pub fn speech(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self::new(
            TaskType::SpeechToText,
            Source::Bytes {
                data,
                mime_type: mime_type.into(),
            },
        )
    }

    /// Synthesize `text` as speech
    pub fn synthesize(text: impl Into<String>) -> Self {
        Self::new(TaskType::TextToSpeech, Source::Text(text.into()))
    }

    /// Embed `text`
    pub fn embedding(text: impl Into<String>) -> Self {
        Self::new(TaskType::Embedding, Source::Text(text.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_round_trip_names() {
        for task in TaskType::ALL {
            assert_eq!(task.as_str().parse::<TaskType>().unwrap(), task);
        }
        assert!("ocr".parse::<TaskType>().is_err());
    }

    #[test]
    fn test_task_type_serializes_snake_case() {
        let json = serde_json::to_string(&TaskType::SpeechToText).unwrap();
        assert_eq!(json, "\"speech_to_text\"");
    }

    #[test]
    fn test_whitespace_text_source_is_empty() {
        assert!(Source::Text("   \n".to_string()).is_empty());
        assert!(!Source::Text("hi".to_string()).is_empty());
    }
}
