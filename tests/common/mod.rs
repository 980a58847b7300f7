//! Shared helpers for integration tests: scripted backends and a
//! tempdir-rooted pipeline.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tempfile::TempDir;

use ingestor::config::ResolvedConfig;
use ingestor::core::embedder;
use ingestor::domain::{AudioClip, ExtractedText, Transcript};
use ingestor::{AppContext, Backend, BackendRegistry, ExtractionRequest, Ingestor, Payload, Store, TaskType};

pub const DIMENSION: usize = 16;

/// What a scripted backend does when invoked
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Return this text (PDF) or transcript (speech)
    Text(String),
    /// Return whitespace only
    Empty,
    /// Return an error
    Fail(&'static str),
    /// Panic inside invoke
    Panic,
    /// Sleep far longer than any test timeout
    Hang,
    /// Fail the availability probe
    Unavailable,
    /// Deterministic pseudo-embedding of the input text
    Embed,
    /// Audio bytes
    Audio(Vec<u8>),
}

pub struct Scripted {
    name: String,
    task: TaskType,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl Scripted {
    pub fn new(name: &str, task: TaskType, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            task,
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for Scripted {
    fn name(&self) -> &str {
        &self.name
    }

    fn task(&self) -> TaskType {
        self.task
    }

    async fn health_check(&self) -> Result<()> {
        if matches!(self.behavior, Behavior::Unavailable) {
            bail!("{} is not installed", self.name);
        }
        Ok(())
    }

    async fn invoke(&self, request: &ExtractionRequest) -> Result<Payload> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match &self.behavior {
            Behavior::Text(text) => Ok(self.text_payload(text.clone())),
            Behavior::Empty => Ok(self.text_payload("  \n ".to_string())),
            Behavior::Fail(message) => bail!("{}", message),
            Behavior::Panic => panic!("scripted panic in {}", self.name),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                bail!("woke up")
            }
            Behavior::Unavailable => bail!("invoked while unavailable"),
            Behavior::Embed => {
                let text = request.source.as_text().unwrap_or_default();
                Ok(Payload::Vector(embedder::embed(text, DIMENSION)))
            }
            Behavior::Audio(bytes) => Ok(Payload::Audio(AudioClip {
                bytes: bytes.clone(),
                mime_type: "audio/wav".to_string(),
            })),
        }
    }
}

impl Scripted {
    fn text_payload(&self, text: String) -> Payload {
        match self.task {
            TaskType::SpeechToText => Payload::Transcript(Transcript {
                text,
                language: "en".to_string(),
                duration_seconds: None,
            }),
            _ => Payload::Text(ExtractedText::new(text).with_pages(1)),
        }
    }
}

/// Registry with the given backends registered in order
pub fn registry(backends: &[Arc<Scripted>]) -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    for backend in backends {
        registry.register_next(Arc::clone(backend) as Arc<dyn Backend>);
    }
    registry
}

/// A pipeline rooted in a fresh tempdir
pub struct Harness {
    pub dir: TempDir,
    pub ingestor: Ingestor,
}

impl Harness {
    pub fn new(backends: &[Arc<Scripted>]) -> Self {
        Self::with_config(backends, |_| {})
    }

    pub fn with_config(backends: &[Arc<Scripted>], tweak: impl FnOnce(&mut ResolvedConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = ResolvedConfig::with_home(dir.path());
        config.embedding.dimension = DIMENSION;
        tweak(&mut config);

        let store = Store::open(&config.database, config.embedding.dimension).unwrap();
        let ingestor = AppContext::from_parts(config, registry(backends), store).ingestor();

        Self { dir, ingestor }
    }

    /// Write a fake PDF into the harness directory
    pub fn pdf(&self, name: &str) -> std::path::PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"%PDF-1.4 fake").unwrap();
        path
    }
}

/// The standard embedding backend used by pipeline tests
pub fn embedder_backend() -> Arc<Scripted> {
    Scripted::new("stub_embed", TaskType::Embedding, Behavior::Embed)
}
