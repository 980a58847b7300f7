//! Backend interfaces for external extraction tools.
//!
//! Backends wrap a CLI tool, an HTTP service or an in-process function behind
//! one trait. Each backend serves exactly one task type; the orchestrator
//! tries them in registry order.

pub mod embedding;
pub mod pdf;
pub mod process;
pub mod speech;
pub mod tts;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::ResolvedConfig;
use crate::core::BackendRegistry;
use crate::domain::{ExtractionRequest, Payload, TaskType};

pub use embedding::{OllamaEmbeddingBackend, OpenAiEmbeddingBackend, PseudoEmbeddingBackend};
pub use pdf::{PdftotextBackend, TesseractBackend, TikaBackend};
pub use speech::{WhisperCliBackend, WhisperHttpBackend};
pub use tts::{EspeakBackend, PiperBackend, SayBackend};

/// Trait for extraction backends
#[async_trait]
pub trait Backend: Send + Sync {
    /// Stable backend name (recorded as `parsed_by` and in attempt logs)
    fn name(&self) -> &str;

    /// The task this backend serves
    fn task(&self) -> TaskType;

    /// Cheap availability probe (binary on PATH, service reachable, key present)
    async fn health_check(&self) -> Result<()>;

    /// Run the backend on a request
    async fn invoke(&self, request: &ExtractionRequest) -> Result<Payload>;
}

/// Build the registry from configuration.
///
/// Per task, backends named in `backends.order` come first in that order,
/// the rest keep their default order, and disabled names are skipped. The
/// pseudo embedder is always appended last when allowed.
pub fn bootstrap(config: &ResolvedConfig) -> BackendRegistry {
    let tools = &config.backends.tools;
    let embedding = &config.embedding;
    let mut registry = BackendRegistry::new();

    let mut pdf: Vec<Arc<dyn Backend>> = vec![Arc::new(PdftotextBackend::new(&tools.pdftotext))];
    if let Some(url) = &tools.tika_url {
        pdf.push(Arc::new(TikaBackend::new(url)));
    }
    pdf.push(Arc::new(TesseractBackend::new(
        &tools.pdftoppm,
        &tools.tesseract,
        tools.ocr_dpi,
    )));

    let mut speech: Vec<Arc<dyn Backend>> = vec![Arc::new(WhisperCliBackend::new(
        &tools.whisper,
        &tools.whisper_model,
    ))];
    if let Some(url) = &tools.whisper_url {
        speech.push(Arc::new(WhisperHttpBackend::new(url, &tools.whisper_model)));
    }

    let tts: Vec<Arc<dyn Backend>> = vec![
        Arc::new(SayBackend::new(&tools.say)),
        Arc::new(PiperBackend::new(&tools.piper, tools.piper_model.clone())),
        Arc::new(EspeakBackend::new(&tools.espeak)),
    ];

    let mut embedders: Vec<Arc<dyn Backend>> = vec![Arc::new(OpenAiEmbeddingBackend::new(
        embedding.openai_api_key.clone(),
        &embedding.openai_base_url,
        &embedding.openai_model,
        embedding.dimension,
    ))];
    if let Some(url) = &embedding.ollama_url {
        embedders.push(Arc::new(OllamaEmbeddingBackend::new(
            url,
            &embedding.ollama_model,
            embedding.dimension,
        )));
    }

    for (task, defaults) in [
        (TaskType::PdfText, pdf),
        (TaskType::SpeechToText, speech),
        (TaskType::TextToSpeech, tts),
        (TaskType::Embedding, embedders),
    ] {
        let preferred = config
            .backends
            .order
            .get(&task)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for backend in arrange(defaults, preferred) {
            if config.backends.is_disabled(backend.name()) {
                debug!(backend = %backend.name(), task = %task, "Backend disabled");
                continue;
            }
            registry.register_next(backend);
        }
    }

    if embedding.allow_pseudo && !config.backends.is_disabled("pseudo") {
        registry.register_next(Arc::new(PseudoEmbeddingBackend::new(embedding.dimension)));
    }

    for task in TaskType::ALL {
        info!(task = %task, backends = ?registry.names(task), "Registered backends");
    }

    registry
}

/// Put preferred names first (in the given order), then the rest unchanged
fn arrange(defaults: Vec<Arc<dyn Backend>>, preferred: &[String]) -> Vec<Arc<dyn Backend>> {
    let mut remaining = defaults;
    let mut ordered = Vec::with_capacity(remaining.len());

    for name in preferred {
        if let Some(idx) = remaining.iter().position(|b| b.name() == name) {
            ordered.push(remaining.remove(idx));
        }
    }
    ordered.extend(remaining);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ResolvedConfig {
        ResolvedConfig::with_home("/tmp/ingestor-test")
    }

    #[test]
    fn test_default_order() {
        let registry = bootstrap(&test_config());

        assert_eq!(
            registry.names(TaskType::PdfText),
            vec!["pdftotext", "tesseract"]
        );
        assert_eq!(
            registry.names(TaskType::TextToSpeech),
            vec!["say", "piper", "espeak"]
        );
        assert_eq!(
            registry.names(TaskType::Embedding),
            vec!["openai", "pseudo"]
        );
    }

    #[test]
    fn test_configured_services_are_registered() {
        let mut config = test_config();
        config.backends.tools.tika_url = Some("http://localhost:9998".to_string());
        config.backends.tools.whisper_url = Some("http://localhost:8001".to_string());
        config.embedding.ollama_url = Some("http://localhost:11434".to_string());

        let registry = bootstrap(&config);
        assert_eq!(
            registry.names(TaskType::PdfText),
            vec!["pdftotext", "tika", "tesseract"]
        );
        assert_eq!(
            registry.names(TaskType::SpeechToText),
            vec!["whisper", "whisper_http"]
        );
        assert_eq!(
            registry.names(TaskType::Embedding),
            vec!["openai", "ollama", "pseudo"]
        );
    }

    #[test]
    fn test_order_and_disabled() {
        let mut config = test_config();
        config.backends.tools.tika_url = Some("http://localhost:9998".to_string());
        config
            .backends
            .order
            .insert(TaskType::PdfText, vec!["tika".to_string(), "unknown".to_string()]);
        config.backends.disabled = vec!["say".to_string()];

        let registry = bootstrap(&config);
        assert_eq!(
            registry.names(TaskType::PdfText),
            vec!["tika", "pdftotext", "tesseract"]
        );
        assert_eq!(
            registry.names(TaskType::TextToSpeech),
            vec!["piper", "espeak"]
        );
    }

    #[test]
    fn test_pseudo_can_be_turned_off() {
        let mut config = test_config();
        config.embedding.allow_pseudo = false;

        let registry = bootstrap(&config);
        assert_eq!(registry.names(TaskType::Embedding), vec!["openai"]);
    }
}
