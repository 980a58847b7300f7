//! Pipeline Integration Tests
//!
//! PDF ingestion, voice commands, embeddings, the document embedding
//! queue and semantic search against a real SQLite file.

mod common;

use std::sync::Arc;

use common::{embedder_backend, Behavior, Harness, Scripted, DIMENSION};
use ingestor::backends::TikaBackend;
use ingestor::config::ResolvedConfig;
use ingestor::domain::{Intent, Sentiment};
use ingestor::pipeline::VoiceInput;
use ingestor::{AppContext, BackendRegistry, IngestError, Store, TaskType};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_pdf_parsed_by_third_backend_and_capped() {
    let long_text = "x".repeat(60_000);
    let harness = Harness::new(&[
        Scripted::new("pdftotext", TaskType::PdfText, Behavior::Empty),
        Scripted::new("tika", TaskType::PdfText, Behavior::Unavailable),
        Scripted::new("tesseract", TaskType::PdfText, Behavior::Text(long_text)),
    ]);
    let path = harness.pdf("scan.pdf");

    let ingestion = harness.ingestor.ingest_pdf(&path).await.unwrap();
    let document = &ingestion.document;

    assert_eq!(document.parsed_by, "tesseract");
    assert_eq!(document.content.chars().count(), 50_000);
    assert!(document.truncated);
    assert_eq!(document.source_type, "pdf");
    assert_eq!(document.source_file, path.display().to_string());
    assert_eq!(ingestion.failures.len(), 2);
    assert!(ingestion.queued_for_embedding);

    let stored = harness
        .ingestor
        .store()
        .get_document(document.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.parsed_by, "tesseract");
    assert_eq!(stored.content.len(), 50_000);
}

#[tokio::test]
async fn test_pdf_all_backends_failed_stores_nothing() {
    let harness = Harness::new(&[
        Scripted::new("pdftotext", TaskType::PdfText, Behavior::Fail("exit 1")),
        Scripted::new("tesseract", TaskType::PdfText, Behavior::Empty),
    ]);
    let path = harness.pdf("broken.pdf");

    let err = harness.ingestor.ingest_pdf(&path).await.unwrap_err();
    match err {
        IngestError::AllBackendsFailed(all) => assert_eq!(all.attempts.len(), 2),
        other => panic!("expected AllBackendsFailed, got {}", other),
    }
    assert!(harness.ingestor.store().recent_documents(10).unwrap().is_empty());
}

#[tokio::test]
async fn test_voice_command_with_embedding() {
    let harness = Harness::new(&[embedder_backend()]);

    let outcome = harness
        .ingestor
        .process_voice(VoiceInput {
            text: "Go to the dashboard, thanks".to_string(),
            user_type: None,
            page_route: Some("/home".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(outcome.intent, Intent::Navigation);
    assert_eq!(outcome.sentiment, Sentiment::Positive);
    assert!(outcome.has_embedding);
    assert!(outcome.command_id.is_some());
    assert_eq!(outcome.response_text, "Navigating you there right now, boss!");
    assert_eq!(outcome.tone, "friendly");
    assert_eq!(outcome.pattern.pattern_text, "go to the dashboard, thanks");
    assert_eq!(outcome.pattern.occurrence_count, 1);

    let entry = harness
        .ingestor
        .store()
        .get_ledger_entry(outcome.ledger_id)
        .unwrap()
        .unwrap();
    assert_eq!(entry.user_type, "boss");
    assert_eq!(entry.page_route, "/home");
    assert_eq!(entry.raw_transcript, "Go to the dashboard, thanks");
}

#[tokio::test]
async fn test_voice_command_without_embedding_backend_still_saves() {
    let harness = Harness::new(&[Scripted::new(
        "broken",
        TaskType::Embedding,
        Behavior::Fail("model not loaded"),
    )]);

    let outcome = harness
        .ingestor
        .process_voice(VoiceInput::new("this is bad"))
        .await
        .unwrap();

    assert_eq!(outcome.intent, Intent::General);
    assert_eq!(outcome.sentiment, Sentiment::Negative);
    assert!(!outcome.has_embedding);
    assert!(outcome.command_id.is_none());
    assert_eq!(outcome.response_text, "Got it! I'm processing your request.");

    let store = harness.ingestor.store();
    assert_eq!(store.ledger_count().unwrap(), 1);
    assert_eq!(store.command_count().unwrap(), 0);
}

#[tokio::test]
async fn test_voice_rejects_blank_text() {
    let harness = Harness::new(&[embedder_backend()]);

    let err = harness
        .ingestor
        .process_voice(VoiceInput::new("  "))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)));
    assert_eq!(harness.ingestor.store().ledger_count().unwrap(), 0);
}

#[tokio::test]
async fn test_repeated_command_counts_occurrences() {
    let harness = Harness::new(&[embedder_backend()]);

    for text in ["Open settings", "open SETTINGS", "open settings"] {
        harness
            .ingestor
            .process_voice(VoiceInput::new(text))
            .await
            .unwrap();
    }

    let patterns = harness.ingestor.patterns(10).await.unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].pattern_text, "open settings");
    assert_eq!(patterns[0].pattern_type, "navigation");
    assert_eq!(patterns[0].occurrence_count, 3);
}

#[tokio::test]
async fn test_concurrent_voice_commands_count_every_occurrence() {
    let harness = Harness::new(&[embedder_backend()]);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let ingestor = harness.ingestor.clone();
        handles.push(tokio::spawn(async move {
            ingestor
                .process_voice(VoiceInput::new("find the blue sofa"))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let pattern = harness
        .ingestor
        .store()
        .get_pattern("find the blue sofa", 100)
        .unwrap()
        .unwrap();
    assert_eq!(pattern.occurrence_count, 20);
    assert_eq!(harness.ingestor.store().ledger_count().unwrap(), 20);
}

#[test]
fn test_pattern_upserts_from_separate_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let first = Store::open(&path, DIMENSION).unwrap();
    let second = Store::open(&path, DIMENSION).unwrap();

    let threads: Vec<_> = [first, second]
        .into_iter()
        .map(|store| {
            std::thread::spawn(move || {
                for _ in 0..25 {
                    store.record_pattern("stop the music", "control", 100).unwrap();
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    let store = Store::open(&path, DIMENSION).unwrap();
    let pattern = store.get_pattern("stop the music", 100).unwrap().unwrap();
    assert_eq!(pattern.occurrence_count, 50);
}

#[tokio::test]
async fn test_embedding_falls_back_in_order() {
    let harness = Harness::new(&[
        Scripted::new("openai", TaskType::Embedding, Behavior::Unavailable),
        Scripted::new("ollama", TaskType::Embedding, Behavior::Fail("connection refused")),
        embedder_backend(),
    ]);

    let outcome = harness.ingestor.embed_text("  hello world  ").await.unwrap();
    assert_eq!(outcome.backend, "stub_embed");
    assert_eq!(outcome.dimension, DIMENSION);

    // Input is trimmed before it reaches the backend
    let again = harness.ingestor.embed_text("hello world").await.unwrap();
    assert_eq!(outcome.embedding, again.embedding);
}

#[tokio::test]
async fn test_similarity_of_identical_texts() {
    let harness = Harness::new(&[embedder_backend()]);

    let same = harness.ingestor.similarity("kitchen", "kitchen").await.unwrap();
    assert!((same - 1.0).abs() < 1e-5);

    let other = harness.ingestor.similarity("kitchen", "garage").await.unwrap();
    assert!((-1.0..=1.0).contains(&other));
}

#[tokio::test]
async fn test_embedding_queue_processing() {
    let harness = Harness::new(&[
        Scripted::new("pdftotext", TaskType::PdfText, Behavior::Text("quarterly report".into())),
        embedder_backend(),
    ]);
    let first = harness.pdf("q1.pdf");
    let second = harness.pdf("q2.pdf");

    let a = harness.ingestor.ingest_pdf(&first).await.unwrap();
    let b = harness.ingestor.ingest_pdf(&second).await.unwrap();

    let report = harness.ingestor.process_embedding_queue(10).await.unwrap();
    assert_eq!(report.total, 2);
    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 0);

    let store = harness.ingestor.store();
    for id in [a.document.id, b.document.id] {
        let document = store.get_document(id).unwrap().unwrap();
        assert_eq!(document.embedding.map(|e| e.len()), Some(DIMENSION));
    }
    let counts = store.queue_counts().unwrap();
    assert_eq!((counts.pending, counts.completed), (0, 2));

    // Nothing left to do
    let report = harness.ingestor.process_embedding_queue(10).await.unwrap();
    assert_eq!(report.total, 0);
}

#[tokio::test]
async fn test_embedding_queue_records_failures() {
    let harness = Harness::new(&[Scripted::new(
        "pdftotext",
        TaskType::PdfText,
        Behavior::Text("invoice".into()),
    )]);
    let path = harness.pdf("invoice.pdf");
    let ingestion = harness.ingestor.ingest_pdf(&path).await.unwrap();

    let report = harness.ingestor.process_embedding_queue(10).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.processed, 0);

    let error = harness
        .ingestor
        .store()
        .embedding_error(ingestion.document.id)
        .unwrap();
    assert!(error.unwrap().contains("no backends registered"));
}

#[tokio::test]
async fn test_document_embedding_queue_can_be_disabled() {
    let harness = Harness::with_config(
        &[Scripted::new("pdftotext", TaskType::PdfText, Behavior::Text("memo".into()))],
        |config| config.pipeline.queue_document_embeddings = false,
    );
    let path = harness.pdf("memo.pdf");

    let ingestion = harness.ingestor.ingest_pdf(&path).await.unwrap();
    assert!(!ingestion.queued_for_embedding);
    assert_eq!(harness.ingestor.store().queue_counts().unwrap().pending, 0);
}

#[tokio::test]
async fn test_search_finds_exact_command_first() {
    let harness = Harness::new(&[embedder_backend()]);

    for text in ["show me the kitchen catalog", "cancel my order", "find oak tables"] {
        harness
            .ingestor
            .process_voice(VoiceInput::new(text))
            .await
            .unwrap();
    }

    let hits = harness
        .ingestor
        .search("cancel my order", Some(5))
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].kind, "command");
    assert_eq!(hits[0].text, "cancel my order");
    assert!((hits[0].similarity - 1.0).abs() < 1e-5);
    assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));
}

#[tokio::test]
async fn test_health_reports_degraded_when_a_task_is_uncovered() {
    let harness = Harness::new(&[
        Scripted::new("pdftotext", TaskType::PdfText, Behavior::Text("x".into())),
        Scripted::new("whisper", TaskType::SpeechToText, Behavior::Unavailable),
        embedder_backend(),
    ]);

    let report = harness.ingestor.health().await;
    assert_eq!(report.status, "degraded");
    assert!(report.backends["pdf_text"]["pdftotext"].available);
    assert!(!report.backends["speech_to_text"]["whisper"].available);
    assert!(report.backends["text_to_speech"].is_empty());
}

#[tokio::test]
async fn test_health_reports_healthy_when_every_task_is_covered() {
    let harness = Harness::new(&[
        Scripted::new("pdftotext", TaskType::PdfText, Behavior::Text("x".into())),
        Scripted::new("whisper", TaskType::SpeechToText, Behavior::Text("x".into())),
        Scripted::new("say", TaskType::TextToSpeech, Behavior::Audio(vec![1])),
        embedder_backend(),
    ]);

    assert_eq!(harness.ingestor.health().await.status, "healthy");
}

#[tokio::test]
async fn test_transcribe_and_synthesize() {
    let harness = Harness::new(&[
        Scripted::new("whisper", TaskType::SpeechToText, Behavior::Text("turn it off".into())),
        Scripted::new("say", TaskType::TextToSpeech, Behavior::Fail("no voices")),
        Scripted::new("espeak", TaskType::TextToSpeech, Behavior::Audio(vec![1, 2, 3])),
    ]);

    let transcription = harness
        .ingestor
        .transcribe(vec![0u8; 32], "audio/wav", Some("en".to_string()))
        .await
        .unwrap();
    assert_eq!(transcription.backend, "whisper");
    assert_eq!(transcription.transcript.text, "turn it off");

    let speech = harness.ingestor.synthesize("hello", None).await.unwrap();
    assert_eq!(speech.backend, "espeak");
    assert_eq!(speech.audio.bytes, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_shared_ingestor_across_tasks() {
    let harness = Harness::new(&[embedder_backend()]);
    let ingestor = Arc::new(harness.ingestor.clone());

    let a = {
        let ingestor = Arc::clone(&ingestor);
        tokio::spawn(async move { ingestor.embed_text("alpha").await })
    };
    let b = {
        let ingestor = Arc::clone(&ingestor);
        tokio::spawn(async move { ingestor.embed_text("beta").await })
    };

    assert_ne!(
        a.await.unwrap().unwrap().embedding,
        b.await.unwrap().unwrap().embedding
    );
}

#[tokio::test]
async fn test_tika_tables_are_counted_on_the_document() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/tika"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><body><div class=\"page\"><p>Price list</p>\
             <table><tr><td>Oak desk</td><td>450</td></tr></table></div>\
             <div class=\"page\"><table><tr><td>Walnut shelf</td><td>120</td></tr></table></div>\
             </body></html>",
        ))
        .mount(&server)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let mut config = ResolvedConfig::with_home(dir.path());
    config.embedding.dimension = DIMENSION;
    let store = Store::open(&config.database, DIMENSION).unwrap();
    let mut registry = BackendRegistry::new();
    registry.register_next(Arc::new(TikaBackend::new(server.uri())));
    let ingestor = AppContext::from_parts(config, registry, store).ingestor();

    let pdf = dir.path().join("price-list.pdf");
    std::fs::write(&pdf, b"%PDF-1.4 tables").unwrap();

    let ingestion = ingestor.ingest_pdf(&pdf).await.unwrap();
    assert_eq!(ingestion.document.parsed_by, "tika");
    assert_eq!(ingestion.document.page_count, Some(2));
    assert_eq!(ingestion.document.table_count, 2);

    let stored = ingestor
        .store()
        .get_document(ingestion.document.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.table_count, 2);
    assert!(stored.content.contains("Walnut shelf"));
}
