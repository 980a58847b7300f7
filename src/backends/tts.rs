//! Text-to-speech backends.
//!
//! Each engine writes audio to a temp file that is read back into memory:
//! macOS `say` (AIFF), `piper` (WAV, needs a voice model), `espeak-ng` (WAV).

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;

use crate::domain::{AudioClip, ExtractionRequest, Payload, TaskType};

use super::process::{require_executable, run};
use super::Backend;

fn request_text(request: &ExtractionRequest) -> Result<&str> {
    request
        .source
        .as_text()
        .context("text-to-speech needs text input")
}

fn output_file(extension: &str) -> Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix("ingestor-tts-")
        .suffix(extension)
        .tempfile()
        .context("Failed to create temp audio file")
}

async fn read_clip(path: &Path, mime_type: &str) -> Result<Payload> {
    let bytes = tokio::fs::read(path)
        .await
        .context("Failed to read synthesized audio")?;
    Ok(Payload::Audio(AudioClip {
        bytes,
        mime_type: mime_type.to_string(),
    }))
}

/// macOS `say`
pub struct SayBackend {
    binary: String,
}

impl SayBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl Backend for SayBackend {
    fn name(&self) -> &str {
        "say"
    }

    fn task(&self) -> TaskType {
        TaskType::TextToSpeech
    }

    async fn health_check(&self) -> Result<()> {
        require_executable(&self.binary).map(|_| ())
    }

    async fn invoke(&self, request: &ExtractionRequest) -> Result<Payload> {
        let text = request_text(request)?;
        let output = output_file(".aiff")?;

        let mut command = Command::new(&self.binary);
        command.arg("-o").arg(output.path());
        if let Some(voice) = &request.options.voice {
            command.arg("-v").arg(voice);
        }
        command.arg("--").arg(text);
        run(&mut command, None, "say").await?;

        read_clip(output.path(), "audio/aiff").await
    }
}

/// Piper neural TTS; text goes in on stdin
pub struct PiperBackend {
    binary: String,
    model: Option<String>,
}

impl PiperBackend {
    pub fn new(binary: impl Into<String>, model: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            model,
        }
    }
}

#[async_trait]
impl Backend for PiperBackend {
    fn name(&self) -> &str {
        "piper"
    }

    fn task(&self) -> TaskType {
        TaskType::TextToSpeech
    }

    async fn health_check(&self) -> Result<()> {
        require_executable(&self.binary)?;
        let model = self
            .model
            .as_deref()
            .context("no piper voice model configured")?;
        if !Path::new(model).exists() {
            anyhow::bail!("piper voice model not found: {}", model);
        }
        Ok(())
    }

    async fn invoke(&self, request: &ExtractionRequest) -> Result<Payload> {
        let text = request_text(request)?;
        let model = self
            .model
            .as_deref()
            .context("no piper voice model configured")?;
        let output = output_file(".wav")?;

        let mut command = Command::new(&self.binary);
        command
            .arg("--model")
            .arg(model)
            .arg("--output_file")
            .arg(output.path());
        run(&mut command, Some(text.as_bytes()), "piper").await?;

        read_clip(output.path(), "audio/wav").await
    }
}

/// eSpeak NG
pub struct EspeakBackend {
    binary: String,
}

impl EspeakBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl Backend for EspeakBackend {
    fn name(&self) -> &str {
        "espeak"
    }

    fn task(&self) -> TaskType {
        TaskType::TextToSpeech
    }

    async fn health_check(&self) -> Result<()> {
        require_executable(&self.binary).map(|_| ())
    }

    async fn invoke(&self, request: &ExtractionRequest) -> Result<Payload> {
        let text = request_text(request)?;
        let output = output_file(".wav")?;

        let mut command = Command::new(&self.binary);
        command.arg("-w").arg(output.path());
        if let Some(voice) = &request.options.voice {
            command.arg("-v").arg(voice);
        }
        command.arg("--").arg(text);
        run(&mut command, None, "espeak-ng").await?;

        read_clip(output.path(), "audio/wav").await
    }
}
