use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::core::{classify, cosine_similarity};
use crate::domain::{
    AudioClip, ClassifiedCommand, Document, ExtractionRequest, FailedAttempt, Intent,
    LearnedPattern, NewDocument, RequestOptions, Sentiment, TaskType, Transcript,
};
use crate::store::{Store, StoreError};

use super::{AppContext, IngestError};

const SNIPPET_CHARS: usize = 200;

/// Result of ingesting one PDF
#[derive(Debug, Clone, Serialize)]
pub struct PdfIngestion {
    pub document: Document,
    /// Backends that failed before `document.parsed_by` succeeded
    pub failures: Vec<FailedAttempt>,
    pub queued_for_embedding: bool,
}

/// A voice command as it arrives from the client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoiceInput {
    pub text: String,
    #[serde(default)]
    pub user_type: Option<String>,
    #[serde(default)]
    pub page_route: Option<String>,
}

impl VoiceInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// What the pipeline did with a voice command
#[derive(Debug, Clone, Serialize)]
pub struct VoiceOutcome {
    pub ledger_id: i64,
    pub command_id: Option<i64>,
    pub intent: Intent,
    pub sentiment: Sentiment,
    pub has_embedding: bool,
    pub response_text: String,
    pub tone: String,
    pub pattern: LearnedPattern,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingOutcome {
    pub embedding: Vec<f32>,
    pub dimension: usize,
    pub backend: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionOutcome {
    pub transcript: Transcript,
    pub backend: String,
}

#[derive(Debug, Clone)]
pub struct SpeechOutcome {
    pub audio: AudioClip,
    pub backend: String,
}

/// One semantic search match
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub kind: &'static str,
    pub id: i64,
    pub text: String,
    pub similarity: f32,
}

/// Embedding queue run summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueReport {
    pub processed: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// "healthy" when every task has an available backend, else "degraded"
    pub status: String,
    pub backends: BTreeMap<String, BTreeMap<String, BackendHealth>>,
    pub timestamp: DateTime<Utc>,
}

/// Runs the ingestion flows
#[derive(Clone)]
pub struct Ingestor {
    ctx: Arc<AppContext>,
}

impl Ingestor {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    pub fn store(&self) -> &Store {
        &self.ctx.store
    }

    /// Run a store call on the blocking pool
    async fn with_store<T, F>(&self, f: F) -> Result<T, IngestError>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.ctx.store.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| IngestError::Internal(format!("store task failed: {}", e)))?
            .map_err(IngestError::from)
    }

    /// Extract a PDF through the fallback chain and persist it
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn ingest_pdf(&self, path: impl AsRef<Path>) -> Result<PdfIngestion, IngestError> {
        let path = path.as_ref();
        let result = self
            .ctx
            .orchestrator
            .execute(ExtractionRequest::pdf(path))
            .await?;

        let backend = result.backend.clone();
        let failures = result.failures.clone();
        let extracted = result
            .into_text()
            .ok_or_else(|| IngestError::Internal("pdf backend returned no text".to_string()))?;

        let cap = self.ctx.config.pipeline.content_cap_chars;
        let (content, truncated) = truncate_chars(&extracted.text, cap);

        let new_document = NewDocument {
            source_file: path.display().to_string(),
            source_type: "pdf".to_string(),
            content,
            parsed_by: backend,
            page_count: extracted.pages,
            table_count: extracted.tables.len(),
            truncated,
        };

        let queue = self.ctx.config.pipeline.queue_document_embeddings;
        let (document, queued) = self
            .with_store(move |store| store.insert_document_with_queue(&new_document, queue))
            .await?;

        info!(
            document_id = document.id,
            parsed_by = %document.parsed_by,
            chars = document.content.chars().count(),
            truncated = document.truncated,
            "Ingested PDF"
        );

        Ok(PdfIngestion {
            document,
            failures,
            queued_for_embedding: queued,
        })
    }

    /// Classify, optionally embed, persist and answer a voice command
    #[instrument(skip(self, input), fields(chars = input.text.chars().count()))]
    pub async fn process_voice(&self, input: VoiceInput) -> Result<VoiceOutcome, IngestError> {
        self.ctx.orchestrator.limits().validate_text(&input.text)?;

        let voice = &self.ctx.config.voice;
        let (intent, sentiment) = classify(&input.text);

        let embedding = if voice.embed_commands {
            match self.embed_text(&input.text).await {
                Ok(outcome) => Some(outcome.embedding),
                Err(e) => {
                    warn!(error = %e, "Command embedding failed, continuing without it");
                    None
                }
            }
        } else {
            None
        };

        let command = ClassifiedCommand {
            raw_text: input.text,
            intent,
            sentiment,
            embedding,
            page_context: input
                .page_route
                .unwrap_or_else(|| voice.default_page_route.clone()),
        };
        let has_embedding = command.embedding.is_some();
        let user_type = input
            .user_type
            .unwrap_or_else(|| voice.default_user_type.clone());
        let key_chars = self.ctx.config.pipeline.pattern_key_chars;

        let saved = self
            .with_store(move |store| store.save_voice_interaction(&user_type, &command, key_chars))
            .await?;

        info!(
            ledger_id = saved.ledger_id,
            intent = %intent,
            sentiment = %sentiment,
            has_embedding,
            "Processed voice command"
        );

        Ok(VoiceOutcome {
            ledger_id: saved.ledger_id,
            command_id: saved.command_id,
            intent,
            sentiment,
            has_embedding,
            response_text: voice.response_for(intent.as_str()).to_string(),
            tone: voice.tone.clone(),
            pattern: saved.pattern,
        })
    }

    /// Embed text through the fallback chain.
    ///
    /// Input is trimmed and cut to the configured character limit first.
    pub async fn embed_text(&self, text: &str) -> Result<EmbeddingOutcome, IngestError> {
        let max_chars = self.ctx.config.embedding.max_input_chars;
        let (prepared, _) = truncate_chars(text.trim(), max_chars);

        let result = self
            .ctx
            .orchestrator
            .execute(ExtractionRequest::embedding(prepared))
            .await?;
        let backend = result.backend.clone();
        let embedding = result
            .into_vector()
            .ok_or_else(|| IngestError::Internal("embedding backend returned no vector".to_string()))?;

        Ok(EmbeddingOutcome {
            dimension: embedding.len(),
            embedding,
            backend,
        })
    }

    /// Cosine similarity of two texts' embeddings
    pub async fn similarity(&self, first: &str, second: &str) -> Result<f32, IngestError> {
        let a = self.embed_text(first).await?;
        let b = self.embed_text(second).await?;
        Ok(cosine_similarity(&a.embedding, &b.embedding))
    }

    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        mime_type: &str,
        language: Option<String>,
    ) -> Result<TranscriptionOutcome, IngestError> {
        let request = ExtractionRequest::speech(audio, mime_type).with_options(RequestOptions {
            language,
            ..Default::default()
        });
        let result = self.ctx.orchestrator.execute(request).await?;
        let backend = result.backend.clone();
        let transcript = result
            .into_transcript()
            .ok_or_else(|| IngestError::Internal("speech backend returned no transcript".to_string()))?;

        Ok(TranscriptionOutcome { transcript, backend })
    }

    pub async fn synthesize(
        &self,
        text: &str,
        voice: Option<String>,
    ) -> Result<SpeechOutcome, IngestError> {
        let request = ExtractionRequest::synthesize(text).with_options(RequestOptions {
            voice,
            ..Default::default()
        });
        let result = self.ctx.orchestrator.execute(request).await?;
        let backend = result.backend.clone();
        let audio = result
            .into_audio()
            .ok_or_else(|| IngestError::Internal("speech synthesis returned no audio".to_string()))?;

        Ok(SpeechOutcome { audio, backend })
    }

    /// Rank stored commands and documents by similarity to `query`
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<SearchHit>, IngestError> {
        let pipeline = &self.ctx.config.pipeline;
        let limit = limit.unwrap_or(pipeline.search_limit);
        let min_similarity = pipeline.search_min_similarity;

        let query = self.embed_text(query).await?;
        let records = self.with_store(|store| store.embedded_records()).await?;

        let mut hits: Vec<SearchHit> = records
            .into_iter()
            .map(|record| SearchHit {
                similarity: cosine_similarity(&query.embedding, &record.embedding),
                kind: record.kind,
                id: record.id,
                text: truncate_chars(&record.text, SNIPPET_CHARS).0,
            })
            .filter(|hit| hit.similarity >= min_similarity)
            .collect();

        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Most frequent learned patterns
    pub async fn patterns(&self, limit: usize) -> Result<Vec<LearnedPattern>, IngestError> {
        self.with_store(move |store| store.top_patterns(limit)).await
    }

    /// Embed up to `limit` pending documents, oldest first
    #[instrument(skip(self))]
    pub async fn process_embedding_queue(&self, limit: usize) -> Result<QueueReport, IngestError> {
        let jobs = self
            .with_store(move |store| store.pending_embeddings(limit))
            .await?;

        let mut report = QueueReport {
            total: jobs.len(),
            ..Default::default()
        };

        for job in jobs {
            match self.embed_text(&job.content).await {
                Ok(outcome) => {
                    self.with_store(move |store| store.complete_embedding(&job, &outcome.embedding))
                        .await?;
                    report.processed += 1;
                }
                Err(e) => {
                    warn!(document_id = job.document_id, error = %e, "Document embedding failed");
                    let message = e.to_string();
                    self.with_store(move |store| store.fail_embedding(&job, &message))
                        .await?;
                    report.failed += 1;
                }
            }
        }

        info!(
            processed = report.processed,
            failed = report.failed,
            total = report.total,
            "Processed embedding queue"
        );
        Ok(report)
    }

    /// Probe every backend
    pub async fn health(&self) -> HealthReport {
        let statuses = self.ctx.orchestrator.availability().await;

        let mut backends: BTreeMap<String, BTreeMap<String, BackendHealth>> = TaskType::ALL
            .iter()
            .map(|task| (task.to_string(), BTreeMap::new()))
            .collect();
        for status in statuses {
            backends.entry(status.task.to_string()).or_default().insert(
                status.name,
                BackendHealth {
                    available: status.available,
                    reason: status.reason,
                },
            );
        }

        let all_covered = backends
            .values()
            .all(|by_name| by_name.values().any(|b| b.available));

        HealthReport {
            status: if all_covered { "healthy" } else { "degraded" }.to_string(),
            backends,
            timestamp: Utc::now(),
        }
    }
}

/// Cut `text` at `max_chars` characters; reports whether anything was cut
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (text[..byte_idx].to_string(), true),
        None => (text.to_string(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        let (cut, truncated) = truncate_chars("ñandú", 3);
        assert_eq!(cut, "ñan");
        assert!(truncated);

        let (whole, truncated) = truncate_chars("abc", 3);
        assert_eq!(whole, "abc");
        assert!(!truncated);
    }
}
