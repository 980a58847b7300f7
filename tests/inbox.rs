//! Inbox Integration Tests
//!
//! Scanning is idempotent per file content; failed files are retried on the
//! next scan.

mod common;

use common::{Behavior, Harness, Scripted};
use ingestor::config::InboxSettings;
use ingestor::inbox::{InboxQueue, InboxStatus, InboxWatcher};
use ingestor::TaskType;

fn watcher(harness: &Harness) -> InboxWatcher {
    let config = &harness.ingestor.context().config;
    InboxWatcher::new(
        config.inbox_dir.clone(),
        InboxSettings::default(),
        InboxQueue::new(config.inbox_queue_path()),
        harness.ingestor.clone(),
    )
}

fn drop_file(harness: &Harness, name: &str, contents: &[u8]) {
    let inbox = &harness.ingestor.context().config.inbox_dir;
    std::fs::create_dir_all(inbox).unwrap();
    std::fs::write(inbox.join(name), contents).unwrap();
}

#[tokio::test]
async fn test_scan_is_idempotent() {
    let harness = Harness::new(&[Scripted::new(
        "pdftotext",
        TaskType::PdfText,
        Behavior::Text("catalog".into()),
    )]);
    drop_file(&harness, "a.pdf", b"%PDF-1.4 first");
    drop_file(&harness, "b.PDF", b"%PDF-1.4 second");
    drop_file(&harness, "notes.txt", b"ignore me");

    let inbox = watcher(&harness);

    let first = inbox.scan_once().await.unwrap();
    assert_eq!(first.new_files, 2);
    assert_eq!(first.ingested, 2);
    assert_eq!(first.failed, 0);

    let second = inbox.scan_once().await.unwrap();
    assert_eq!(second.new_files, 0);
    assert_eq!(second.already_ingested, 2);
    assert_eq!(second.ingested, 0);

    assert_eq!(harness.ingestor.store().recent_documents(10).unwrap().len(), 2);

    let summary = inbox.queue().summary().await.unwrap();
    assert_eq!(summary.ingested, 2);
    assert_eq!(summary.pending, 0);
}

#[tokio::test]
async fn test_duplicate_content_is_queued_once() {
    let harness = Harness::new(&[Scripted::new(
        "pdftotext",
        TaskType::PdfText,
        Behavior::Text("catalog".into()),
    )]);
    drop_file(&harness, "original.pdf", b"%PDF-1.4 same");
    drop_file(&harness, "copy.pdf", b"%PDF-1.4 same");

    let report = watcher(&harness).scan_once().await.unwrap();
    assert_eq!(report.new_files, 1);
    assert_eq!(report.ingested, 1);
    assert_eq!(report.total_scanned(), 2);
}

#[tokio::test]
async fn test_failed_file_is_retried_on_next_scan() {
    let harness = Harness::new(&[Scripted::new(
        "pdftotext",
        TaskType::PdfText,
        Behavior::Fail("syntax error"),
    )]);
    drop_file(&harness, "broken.pdf", b"%PDF-1.4 broken");

    let inbox = watcher(&harness);

    let first = inbox.scan_once().await.unwrap();
    assert_eq!(first.failed, 1);

    let items = inbox.queue().recent(5).await.unwrap();
    assert_eq!(items[0].status, InboxStatus::Failed);
    assert!(items[0].error.as_deref().unwrap().contains("syntax error"));

    let second = inbox.scan_once().await.unwrap();
    assert_eq!(second.reset_for_retry, 1);
    assert_eq!(second.failed, 1);
}

#[tokio::test]
async fn test_scan_creates_missing_inbox() {
    let harness = Harness::new(&[]);
    let inbox = watcher(&harness);
    assert!(!inbox.dir().exists());

    let report = inbox.scan_once().await.unwrap();
    assert_eq!(report, Default::default());
    assert!(inbox.dir().exists());
}
