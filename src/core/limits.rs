//! Input limits and request validation.
//!
//! Requests are validated before any backend is attempted:
//! - Text must be non-empty and within size limits
//! - Audio and PDF inputs must be within size limits
//! - PDF paths must exist and must not match the denylist

use std::path::Path;

use glob::Pattern;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ExtractionRequest, Source, TaskType};

/// Input limits for extraction requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputLimits {
    /// Maximum text input in bytes (default: 1MB)
    #[serde(default = "default_max_text_bytes")]
    pub max_text_bytes: u64,

    /// Maximum uploaded audio in bytes (default: 50MB)
    #[serde(default = "default_max_audio_bytes")]
    pub max_audio_bytes: u64,

    /// Maximum PDF file size in bytes (default: 100MB)
    #[serde(default = "default_max_pdf_bytes")]
    pub max_pdf_bytes: u64,

    /// Glob patterns to reject (files matching these won't be ingested)
    #[serde(default = "default_denylist")]
    pub denylist_patterns: Vec<String>,
}

fn default_max_text_bytes() -> u64 {
    1024 * 1024
}
fn default_max_audio_bytes() -> u64 {
    50 * 1024 * 1024
}
fn default_max_pdf_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_denylist() -> Vec<String> {
    vec![
        "**/.env*".to_string(),
        "**/secrets*".to_string(),
        "**/*credential*".to_string(),
        "**/*.pem".to_string(),
        "**/*.key".to_string(),
    ]
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            max_text_bytes: default_max_text_bytes(),
            max_audio_bytes: default_max_audio_bytes(),
            max_pdf_bytes: default_max_pdf_bytes(),
            denylist_patterns: default_denylist(),
        }
    }
}

impl InputLimits {
    /// Check if a path matches any denylist pattern
    pub fn is_denylisted(&self, path: &str) -> bool {
        self.denylist_patterns
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .any(|pattern| pattern.matches(path))
    }

    /// Validate a request before it reaches any backend
    pub fn validate(&self, request: &ExtractionRequest) -> Result<(), ValidationError> {
        match (request.task, &request.source) {
            (TaskType::PdfText, Source::Path(path)) => self.validate_pdf_path(path),
            (TaskType::SpeechToText, Source::Path(path)) => self.validate_file(path, self.max_audio_bytes),
            (TaskType::SpeechToText, Source::Bytes { data, .. }) => {
                if data.is_empty() {
                    return Err(ValidationError::EmptyInput("audio"));
                }
                check_size(data.len() as u64, self.max_audio_bytes)
            }
            (TaskType::TextToSpeech | TaskType::Embedding, Source::Text(text)) => {
                self.validate_text(text)
            }
            (task, source) => Err(ValidationError::UnsupportedSource {
                task,
                source_kind: source_kind(source),
            }),
        }
    }

    /// Validate free text (voice commands, embedding input)
    pub fn validate_text(&self, text: &str) -> Result<(), ValidationError> {
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyInput("text"));
        }
        check_size(text.len() as u64, self.max_text_bytes)
    }

    fn validate_pdf_path(&self, path: &Path) -> Result<(), ValidationError> {
        let path_str = path.to_string_lossy();
        if self.is_denylisted(&path_str) {
            return Err(ValidationError::Denylisted {
                path: path_str.to_string(),
            });
        }
        self.validate_file(path, self.max_pdf_bytes)
    }

    fn validate_file(&self, path: &Path, limit: u64) -> Result<(), ValidationError> {
        if path.as_os_str().is_empty() {
            return Err(ValidationError::EmptyInput("path"));
        }
        let metadata = std::fs::metadata(path)
            .map_err(|_| ValidationError::FileNotFound(path.display().to_string()))?;
        if !metadata.is_file() {
            return Err(ValidationError::FileNotFound(path.display().to_string()));
        }
        check_size(metadata.len(), limit)
    }
}

fn check_size(actual: u64, limit: u64) -> Result<(), ValidationError> {
    if actual > limit {
        return Err(ValidationError::TooLarge { actual, limit });
    }
    Ok(())
}

fn source_kind(source: &Source) -> &'static str {
    match source {
        Source::Path(_) => "path",
        Source::Bytes { .. } => "bytes",
        Source::Text(_) => "text",
    }
}

/// Invalid input, rejected before any backend runs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    EmptyInput(&'static str),

    #[error("input too large: {actual} > {limit} bytes")]
    TooLarge { actual: u64, limit: u64 },

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("path matches denylist pattern: {path}")]
    Denylisted { path: String },

    #[error("{task} does not accept {source_kind} input")]
    UnsupportedSource {
        task: TaskType,
        source_kind: &'static str,
    },
}
