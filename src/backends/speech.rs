//! Speech-to-text backends.
//!
//! The local whisper CLI is tried first; an OpenAI-compatible transcription
//! server (faster-whisper-server, Speaches) follows when configured.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::domain::{ExtractionRequest, Payload, Source, TaskType, Transcript};

use super::process::{audio_extension, require_executable, run};
use super::Backend;

const DEFAULT_LANGUAGE: &str = "en";

/// Whisper JSON output (CLI file and verbose_json API response share this shape)
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    end: f64,
}

impl WhisperOutput {
    fn into_transcript(self, requested_language: Option<&str>) -> Transcript {
        let duration = self
            .duration
            .or_else(|| self.segments.last().map(|s| s.end));
        let language = self
            .language
            .filter(|l| !l.is_empty())
            .or_else(|| requested_language.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        Transcript {
            text: self.text.trim().to_string(),
            language,
            duration_seconds: duration,
        }
    }
}

/// Local `whisper` binary (openai-whisper CLI)
pub struct WhisperCliBackend {
    binary: String,
    model: String,
}

impl WhisperCliBackend {
    pub fn new(binary: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            model: model.into(),
        }
    }

    async fn transcribe_file(&self, audio_path: &Path, language: Option<&str>) -> Result<Transcript> {
        let temp_dir = tempfile::tempdir().context("Failed to create temp dir")?;

        let mut command = Command::new(&self.binary);
        command
            .arg(audio_path)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_dir")
            .arg(temp_dir.path())
            .arg("--output_format")
            .arg("json");
        if let Some(lang) = language {
            command.arg("--language").arg(lang);
        }

        run(&mut command, None, "whisper").await?;

        let stem = audio_path.file_stem().unwrap_or_default().to_string_lossy();
        let json_path = temp_dir.path().join(format!("{}.json", stem));
        let json_content = tokio::fs::read_to_string(&json_path)
            .await
            .context("Failed to read whisper output")?;

        let whisper: WhisperOutput =
            serde_json::from_str(&json_content).context("Failed to parse whisper JSON")?;

        Ok(whisper.into_transcript(language))
    }
}

#[async_trait]
impl Backend for WhisperCliBackend {
    fn name(&self) -> &str {
        "whisper"
    }

    fn task(&self) -> TaskType {
        TaskType::SpeechToText
    }

    async fn health_check(&self) -> Result<()> {
        require_executable(&self.binary).map(|_| ())
    }

    async fn invoke(&self, request: &ExtractionRequest) -> Result<Payload> {
        let language = request.options.language.as_deref();

        let transcript = match &request.source {
            Source::Path(path) => self.transcribe_file(path, language).await?,
            Source::Bytes { data, mime_type } => {
                let mut file = tempfile::Builder::new()
                    .prefix("ingestor-audio-")
                    .suffix(&format!(".{}", audio_extension(mime_type)))
                    .tempfile()
                    .context("Failed to create temp audio file")?;
                file.write_all(data).context("Failed to write temp audio file")?;
                file.flush().context("Failed to flush temp audio file")?;
                self.transcribe_file(file.path(), language).await?
            }
            Source::Text(_) => anyhow::bail!("speech-to-text needs audio input"),
        };

        Ok(Payload::Transcript(transcript))
    }
}

/// OpenAI-compatible transcription server (`POST /v1/audio/transcriptions`)
pub struct WhisperHttpBackend {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl WhisperHttpBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Backend for WhisperHttpBackend {
    fn name(&self) -> &str {
        "whisper_http"
    }

    fn task(&self) -> TaskType {
        TaskType::SpeechToText
    }

    async fn health_check(&self) -> Result<()> {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .with_context(|| format!("Whisper server unreachable at {}", self.base_url))?
            .error_for_status()
            .context("Whisper server health check failed")?;
        Ok(())
    }

    async fn invoke(&self, request: &ExtractionRequest) -> Result<Payload> {
        let (data, mime_type) = match &request.source {
            Source::Bytes { data, mime_type } => (data.clone(), mime_type.clone()),
            Source::Path(path) => {
                let data = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                (data, "audio/wav".to_string())
            }
            Source::Text(_) => anyhow::bail!("speech-to-text needs audio input"),
        };

        let file_part = reqwest::multipart::Part::bytes(data)
            .file_name(format!("audio.{}", audio_extension(&mime_type)))
            .mime_str(&mime_type)
            .context("Invalid audio MIME type")?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");
        if let Some(lang) = &request.options.language {
            form = form.text("language", lang.clone());
        }

        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .multipart(form)
            .send()
            .await
            .context("Transcription request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Whisper API returned {}: {}", status, body);
        }

        let whisper: WhisperOutput = response
            .json()
            .await
            .context("Failed to parse whisper response")?;

        Ok(Payload::Transcript(
            whisper.into_transcript(request.options.language.as_deref()),
        ))
    }
}
