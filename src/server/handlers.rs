//! HTTP handlers.

use std::collections::BTreeMap;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::pipeline::{Ingestor, VoiceInput};

use super::error::{ApiError, ApiJson, ApiQuery};

const DEFAULT_PATTERN_LIMIT: usize = 20;
const DEFAULT_QUEUE_LIMIT: usize = 50;

/// Non-blank text from an optional request field
fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ApiError::bad_request(format!("{} is required", field))),
    }
}

pub async fn health(State(ingestor): State<Ingestor>) -> Json<Value> {
    let report = ingestor.health().await;

    let backends: BTreeMap<String, BTreeMap<String, bool>> = report
        .backends
        .into_iter()
        .map(|(task, by_name)| {
            let flags = by_name
                .into_iter()
                .map(|(name, health)| (name, health.available))
                .collect();
            (task, flags)
        })
        .collect();

    Json(json!({
        "status": report.status,
        "backends": backends,
        "timestamp": report.timestamp,
    }))
}

#[derive(Debug, Deserialize)]
pub struct EmbedRequest {
    text: Option<String>,
}

pub async fn embed(
    State(ingestor): State<Ingestor>,
    ApiJson(body): ApiJson<EmbedRequest>,
) -> Result<Json<Value>, ApiError> {
    let text = required(body.text, "text")?;
    let outcome = ingestor.embed_text(&text).await?;

    Ok(Json(json!({
        "success": true,
        "embedding": outcome.embedding,
        "dimension": outcome.dimension,
        "backend": outcome.backend,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SimilarityRequest {
    text1: Option<String>,
    text2: Option<String>,
}

pub async fn similarity(
    State(ingestor): State<Ingestor>,
    ApiJson(body): ApiJson<SimilarityRequest>,
) -> Result<Json<Value>, ApiError> {
    let first = required(body.text1, "text1")?;
    let second = required(body.text2, "text2")?;
    let similarity = ingestor.similarity(&first, &second).await?;

    Ok(Json(json!({ "success": true, "similarity": similarity })))
}

pub async fn stt(
    State(ingestor): State<Ingestor>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let mut multipart = multipart?;
    let mut audio: Option<(Vec<u8>, String)> = None;
    let mut language: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {}", e)))?
    {
        match field.name() {
            Some("audio") => {
                let mime_type = field
                    .content_type()
                    .unwrap_or("audio/wav")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read audio: {}", e)))?;
                audio = Some((data.to_vec(), mime_type));
            }
            Some("language") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("invalid language: {}", e)))?;
                if !value.trim().is_empty() {
                    language = Some(value.trim().to_string());
                }
            }
            _ => {}
        }
    }

    let (data, mime_type) = audio.ok_or_else(|| ApiError::bad_request("audio is required"))?;
    let outcome = ingestor.transcribe(data, &mime_type, language).await?;

    Ok(Json(json!({
        "success": true,
        "text": outcome.transcript.text,
        "language": outcome.transcript.language,
        "backend": outcome.backend,
    })))
}

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    text: Option<String>,
    #[serde(default)]
    voice: Option<String>,
}

pub async fn tts(
    State(ingestor): State<Ingestor>,
    ApiJson(body): ApiJson<TtsRequest>,
) -> Result<Response, ApiError> {
    let text = required(body.text, "text")?;
    let outcome = ingestor.synthesize(&text, body.voice).await?;

    Ok((
        [
            (header::CONTENT_TYPE, outcome.audio.mime_type),
            (header::HeaderName::from_static("x-tts-backend"), outcome.backend),
        ],
        outcome.audio.bytes,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    text: Option<String>,
    #[serde(default)]
    user_type: Option<String>,
    #[serde(default)]
    page_route: Option<String>,
}

pub async fn process(
    State(ingestor): State<Ingestor>,
    ApiJson(body): ApiJson<ProcessRequest>,
) -> Result<Json<Value>, ApiError> {
    let text = required(body.text, "text")?;
    let outcome = ingestor
        .process_voice(VoiceInput {
            text,
            user_type: body.user_type,
            page_route: body.page_route,
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "ledger_id": outcome.ledger_id,
        "analysis": {
            "intent": outcome.intent,
            "sentiment": outcome.sentiment,
            "hasEmbedding": outcome.has_embedding,
        },
        "response": {
            "text": outcome.response_text,
            "tone": outcome.tone,
        },
    })))
}

#[derive(Debug, Deserialize)]
pub struct PdfRequest {
    path: Option<String>,
}

pub async fn pdf(
    State(ingestor): State<Ingestor>,
    ApiJson(body): ApiJson<PdfRequest>,
) -> Result<Json<Value>, ApiError> {
    let path = required(body.path, "path")?;
    let ingestion = ingestor.ingest_pdf(&path).await?;
    let document = ingestion.document;

    Ok(Json(json!({
        "success": true,
        "document_id": document.id,
        "parsed_by": document.parsed_by,
        "content_length": document.content.chars().count(),
        "truncated": document.truncated,
        "page_count": document.page_count,
        "failures": ingestion.failures,
        "queued_for_embedding": ingestion.queued_for_embedding,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    query: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

pub async fn search(
    State(ingestor): State<Ingestor>,
    ApiJson(body): ApiJson<SearchRequest>,
) -> Result<Json<Value>, ApiError> {
    let query = required(body.query, "query")?;
    let results = ingestor.search(&query, body.limit).await?;

    Ok(Json(json!({ "success": true, "results": results })))
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    limit: Option<usize>,
}

pub async fn patterns(
    State(ingestor): State<Ingestor>,
    ApiQuery(params): ApiQuery<LimitParams>,
) -> Result<Json<Value>, ApiError> {
    let patterns = ingestor
        .patterns(params.limit.unwrap_or(DEFAULT_PATTERN_LIMIT))
        .await?;

    Ok(Json(json!({ "success": true, "patterns": patterns })))
}

pub async fn process_queue(
    State(ingestor): State<Ingestor>,
    body: Option<ApiJson<LimitParams>>,
) -> Result<Json<Value>, ApiError> {
    let limit = body
        .and_then(|ApiJson(params)| params.limit)
        .unwrap_or(DEFAULT_QUEUE_LIMIT);
    let report = ingestor.process_embedding_queue(limit).await?;

    Ok(Json(json!({
        "success": true,
        "processed": report.processed,
        "failed": report.failed,
        "total": report.total,
    })))
}
