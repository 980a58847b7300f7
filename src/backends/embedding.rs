//! Embedding backends.
//!
//! OpenAI and Ollama produce semantic vectors; the pseudo embedder is a
//! deterministic hash fallback that is always available. Every backend must
//! return unit-length vectors of the configured dimension.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::embedder;
use crate::domain::{ExtractionRequest, Payload, TaskType};

use super::Backend;

fn request_text(request: &ExtractionRequest) -> Result<&str> {
    request
        .source
        .as_text()
        .context("embedding needs text input")
}

/// Check the dimension and L2-normalize a remote vector
fn unit_vector(vector: Vec<f32>, expected: usize, backend: &str) -> Result<Payload> {
    if vector.len() != expected {
        anyhow::bail!(
            "{} returned a {}-dimensional vector, expected {}",
            backend,
            vector.len(),
            expected
        );
    }

    let length = embedder::norm(&vector);
    if !length.is_finite() || length == 0.0 {
        anyhow::bail!("{} returned a vector that cannot be normalized", backend);
    }

    Ok(Payload::Vector(
        vector.into_iter().map(|x| (x as f64 / length) as f32).collect(),
    ))
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/v1/embeddings`
pub struct OpenAiEmbeddingBackend {
    api_key: Option<String>,
    base_url: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
}

impl OpenAiEmbeddingBackend {
    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimension,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Backend for OpenAiEmbeddingBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn task(&self) -> TaskType {
        TaskType::Embedding
    }

    async fn health_check(&self) -> Result<()> {
        match self.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(()),
            _ => anyhow::bail!("OPENAI_API_KEY not set"),
        }
    }

    async fn invoke(&self, request: &ExtractionRequest) -> Result<Payload> {
        let text = request_text(request)?;
        let key = self.api_key.as_deref().context("OPENAI_API_KEY not set")?;

        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(key)
            .json(&OpenAiRequest {
                model: &self.model,
                input: text,
                dimensions: self.dimension,
            })
            .send()
            .await
            .context("OpenAI embedding request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI embedding failed: {} - {}", status, body);
        }

        let parsed: OpenAiResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .context("No embedding returned")?;

        unit_vector(vector, self.dimension, "openai")
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Local Ollama server (`POST /api/embed`)
pub struct OllamaEmbeddingBackend {
    base_url: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
}

impl OllamaEmbeddingBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimension,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Backend for OllamaEmbeddingBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn task(&self) -> TaskType {
        TaskType::Embedding
    }

    async fn health_check(&self) -> Result<()> {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .with_context(|| format!("Ollama unreachable at {}", self.base_url))?
            .error_for_status()
            .context("Ollama health check failed")?;
        Ok(())
    }

    async fn invoke(&self, request: &ExtractionRequest) -> Result<Payload> {
        let text = request_text(request)?;

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&OllamaRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .context("Ollama request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama embedding failed: {} - {}", status, body);
        }

        let parsed: OllamaResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;
        let vector = parsed
            .embeddings
            .into_iter()
            .next()
            .context("No embedding returned")?;

        unit_vector(vector, self.dimension, "ollama")
    }
}

/// Deterministic SHA-512 pseudo embedding (no semantic meaning)
pub struct PseudoEmbeddingBackend {
    dimension: usize,
}

impl PseudoEmbeddingBackend {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Backend for PseudoEmbeddingBackend {
    fn name(&self) -> &str {
        "pseudo"
    }

    fn task(&self) -> TaskType {
        TaskType::Embedding
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn invoke(&self, request: &ExtractionRequest) -> Result<Payload> {
        let text = request_text(request)?;
        Ok(Payload::Vector(embedder::embed(text, self.dimension)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_openai_requires_key() {
        let backend = OpenAiEmbeddingBackend::new(None, "http://localhost:1", "m", 4);
        assert!(backend.health_check().await.is_err());
    }

    #[tokio::test]
    async fn test_openai_embeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"dimensions": 3})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [3.0, 0.0, 4.0]}]
            })))
            .mount(&server)
            .await;

        let backend = OpenAiEmbeddingBackend::new(
            Some("sk-test".to_string()),
            server.uri(),
            "text-embedding-3-small",
            3,
        );
        let payload = backend
            .invoke(&ExtractionRequest::embedding("ceramic tiles"))
            .await
            .unwrap();
        assert_eq!(payload, Payload::Vector(vec![0.6, 0.0, 0.8]));
    }

    #[tokio::test]
    async fn test_ollama_vectors_are_unit_length() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [[0.12, -0.7, 2.5, 0.031]]
            })))
            .mount(&server)
            .await;

        let backend = OllamaEmbeddingBackend::new(server.uri(), "all-minilm", 4);
        let payload = backend
            .invoke(&ExtractionRequest::embedding("hello"))
            .await
            .unwrap();
        match payload {
            Payload::Vector(vector) => assert!((embedder::norm(&vector) - 1.0).abs() <= 1e-6),
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_vector_is_rejected() {
        let err = unit_vector(vec![0.0; 4], 4, "ollama").unwrap_err();
        assert!(err.to_string().contains("cannot be normalized"));
    }

    #[tokio::test]
    async fn test_ollama_dimension_mismatch_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [[0.5, 0.5]]
            })))
            .mount(&server)
            .await;

        let backend = OllamaEmbeddingBackend::new(server.uri(), "all-minilm", 384);
        let err = backend
            .invoke(&ExtractionRequest::embedding("hello"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expected 384"));
    }

    #[tokio::test]
    async fn test_pseudo_matches_embedder() {
        let backend = PseudoEmbeddingBackend::new(16);
        let payload = backend
            .invoke(&ExtractionRequest::embedding("hello"))
            .await
            .unwrap();
        assert_eq!(payload, Payload::Vector(embedder::embed("hello", 16)));
    }
}
