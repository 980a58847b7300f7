//! JSONL-based inbox queue for idempotent PDF ingestion.
//!
//! Append-only JSONL log with state derived from replay. Items are keyed by
//! a hash of the file content, so a file copied into the inbox twice (or
//! renamed) is ingested once.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Length of the content-hash item id (hex chars)
const ID_LEN: usize = 16;

/// Errors that can occur with the inbox queue
#[derive(Debug, Error)]
pub enum InboxQueueError {
    #[error("Inbox item not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Lifecycle of an inbox item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboxStatus {
    Pending,
    Ingested,
    Failed,
}

/// An event in the queue log (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEvent {
    pub timestamp: DateTime<Utc>,

    /// The queue item ID (content hash)
    pub item_id: String,

    #[serde(flatten)]
    pub kind: QueueEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum QueueEventKind {
    Enqueued { file: InboxFile },
    Ingested { document_id: i64, parsed_by: String },
    Failed { error: String },
    ResetForRetry,
}

/// Metadata for a detected PDF
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxFile {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
    pub detected_at: DateTime<Utc>,
}

/// Current state of an item (derived from replaying events)
#[derive(Debug, Clone)]
pub struct InboxItem {
    pub id: String,
    pub status: InboxStatus,
    pub file: InboxFile,
    pub document_id: Option<i64>,
    pub parsed_by: Option<String>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub updated_at: DateTime<Utc>,
}

/// Result of enqueueing a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueResult {
    Queued(String),
    AlreadyQueued(String),
    AlreadyIngested(String),
    ResetForRetry(String),
}

impl EnqueueResult {
    pub fn id(&self) -> &str {
        match self {
            Self::Queued(id)
            | Self::AlreadyQueued(id)
            | Self::AlreadyIngested(id)
            | Self::ResetForRetry(id) => id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Queued(_))
    }
}

/// Queue status summary
#[derive(Debug, Clone, Default, Serialize)]
pub struct InboxSummary {
    pub pending: usize,
    pub ingested: usize,
    pub failed: usize,
}

impl InboxSummary {
    pub fn total(&self) -> usize {
        self.pending + self.ingested + self.failed
    }
}

/// JSONL-backed inbox queue
#[derive(Debug, Clone)]
pub struct InboxQueue {
    path: PathBuf,
}

impl InboxQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Open a queue, creating its parent directory
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, InboxQueueError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an event under an exclusive file lock
    fn append_event(&self, item_id: &str, kind: QueueEventKind) -> Result<(), InboxQueueError> {
        let event = QueueEvent {
            timestamp: Utc::now(),
            item_id: item_id.to_string(),
            kind,
        };
        let line = format!("{}\n", serde_json::to_string(&event)?);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;
        let written = file.write_all(line.as_bytes()).and_then(|_| file.flush());
        // Release before surfacing a write error
        file.unlock()?;
        written?;

        Ok(())
    }

    /// Replay all events to build current state
    pub async fn replay(&self) -> Result<HashMap<String, InboxItem>, InboxQueueError> {
        let mut items: HashMap<String, InboxItem> = HashMap::new();

        if !self.path.exists() {
            return Ok(items);
        }

        let file = File::open(&self.path).await?;
        let mut lines = BufReader::new(file).lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: QueueEvent = serde_json::from_str(&line)?;
            apply_event(&mut items, event);
        }

        Ok(items)
    }

    /// Enqueue a file (idempotent per content hash)
    pub async fn enqueue(
        &self,
        path: &Path,
        size: u64,
        detected_at: DateTime<Utc>,
    ) -> Result<EnqueueResult, InboxQueueError> {
        let id = compute_file_hash(path).await?;
        let items = self.replay().await?;

        if let Some(existing) = items.get(&id) {
            return match existing.status {
                InboxStatus::Ingested => Ok(EnqueueResult::AlreadyIngested(id)),
                InboxStatus::Pending => Ok(EnqueueResult::AlreadyQueued(id)),
                InboxStatus::Failed => {
                    self.append_event(&id, QueueEventKind::ResetForRetry)?;
                    Ok(EnqueueResult::ResetForRetry(id))
                }
            };
        }

        let file = InboxFile {
            path: path.to_path_buf(),
            file_name: path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
            size,
            detected_at,
        };
        self.append_event(&id, QueueEventKind::Enqueued { file })?;

        Ok(EnqueueResult::Queued(id))
    }

    /// Pending items, oldest detection first
    pub async fn pending(&self) -> Result<Vec<InboxItem>, InboxQueueError> {
        let mut pending: Vec<InboxItem> = self
            .replay()
            .await?
            .into_values()
            .filter(|item| item.status == InboxStatus::Pending)
            .collect();
        pending.sort_by(|a, b| a.file.detected_at.cmp(&b.file.detected_at));
        Ok(pending)
    }

    pub async fn mark_ingested(
        &self,
        id: &str,
        document_id: i64,
        parsed_by: &str,
    ) -> Result<(), InboxQueueError> {
        self.ensure_exists(id).await?;
        self.append_event(
            id,
            QueueEventKind::Ingested {
                document_id,
                parsed_by: parsed_by.to_string(),
            },
        )
    }

    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<(), InboxQueueError> {
        self.ensure_exists(id).await?;
        self.append_event(
            id,
            QueueEventKind::Failed {
                error: error.to_string(),
            },
        )
    }

    pub async fn get(&self, id: &str) -> Result<Option<InboxItem>, InboxQueueError> {
        Ok(self.replay().await?.remove(id))
    }

    pub async fn summary(&self) -> Result<InboxSummary, InboxQueueError> {
        let mut summary = InboxSummary::default();
        for item in self.replay().await?.values() {
            match item.status {
                InboxStatus::Pending => summary.pending += 1,
                InboxStatus::Ingested => summary.ingested += 1,
                InboxStatus::Failed => summary.failed += 1,
            }
        }
        Ok(summary)
    }

    /// Most recently updated items first
    pub async fn recent(&self, limit: usize) -> Result<Vec<InboxItem>, InboxQueueError> {
        let mut items: Vec<InboxItem> = self.replay().await?.into_values().collect();
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        items.truncate(limit);
        Ok(items)
    }

    async fn ensure_exists(&self, id: &str) -> Result<(), InboxQueueError> {
        if self.replay().await?.contains_key(id) {
            Ok(())
        } else {
            Err(InboxQueueError::NotFound(id.to_string()))
        }
    }
}

fn apply_event(items: &mut HashMap<String, InboxItem>, event: QueueEvent) {
    let QueueEvent {
        timestamp,
        item_id,
        kind,
    } = event;

    if let QueueEventKind::Enqueued { file } = kind {
        items.insert(
            item_id.clone(),
            InboxItem {
                id: item_id,
                status: InboxStatus::Pending,
                file,
                document_id: None,
                parsed_by: None,
                error: None,
                retry_count: 0,
                updated_at: timestamp,
            },
        );
        return;
    }

    let Some(item) = items.get_mut(&item_id) else {
        return;
    };
    item.updated_at = timestamp;

    match kind {
        QueueEventKind::Enqueued { .. } => {}
        QueueEventKind::Ingested {
            document_id,
            parsed_by,
        } => {
            item.status = InboxStatus::Ingested;
            item.document_id = Some(document_id);
            item.parsed_by = Some(parsed_by);
            item.error = None;
        }
        QueueEventKind::Failed { error } => {
            item.status = InboxStatus::Failed;
            item.error = Some(error);
        }
        QueueEventKind::ResetForRetry => {
            item.status = InboxStatus::Pending;
            item.retry_count += 1;
            item.error = None;
        }
    }
}

/// SHA-256 of file content, first 16 hex chars
pub async fn compute_file_hash(path: &Path) -> Result<String, std::io::Error> {
    let content = tokio::fs::read(path).await?;
    let digest = Sha256::digest(&content);
    let mut id = hex::encode(digest);
    id.truncate(ID_LEN);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn queue_in(temp: &TempDir) -> InboxQueue {
        InboxQueue::new(temp.path().join("inbox_queue.jsonl"))
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent_by_content() {
        let temp = TempDir::new().unwrap();
        let queue = queue_in(&temp);

        let first = temp.path().join("a.pdf");
        let copy = temp.path().join("copy of a.pdf");
        tokio::fs::write(&first, b"%PDF same bytes").await.unwrap();
        tokio::fs::write(&copy, b"%PDF same bytes").await.unwrap();

        let r1 = queue.enqueue(&first, 15, Utc::now()).await.unwrap();
        let r2 = queue.enqueue(&copy, 15, Utc::now()).await.unwrap();

        assert!(r1.is_new());
        assert_eq!(r2, EnqueueResult::AlreadyQueued(r1.id().to_string()));
        assert_eq!(queue.summary().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_ingested_then_skipped() {
        let temp = TempDir::new().unwrap();
        let queue = queue_in(&temp);
        let pdf = temp.path().join("a.pdf");
        tokio::fs::write(&pdf, b"%PDF").await.unwrap();

        let id = queue.enqueue(&pdf, 4, Utc::now()).await.unwrap().id().to_string();
        queue.mark_ingested(&id, 7, "pdftotext").await.unwrap();

        let again = queue.enqueue(&pdf, 4, Utc::now()).await.unwrap();
        assert_eq!(again, EnqueueResult::AlreadyIngested(id.clone()));

        let item = queue.get(&id).await.unwrap().unwrap();
        assert_eq!(item.document_id, Some(7));
        assert_eq!(item.parsed_by.as_deref(), Some("pdftotext"));
    }

    #[tokio::test]
    async fn test_failed_item_is_retried() {
        let temp = TempDir::new().unwrap();
        let queue = queue_in(&temp);
        let pdf = temp.path().join("scan.pdf");
        tokio::fs::write(&pdf, b"%PDF scanned").await.unwrap();

        let id = queue.enqueue(&pdf, 12, Utc::now()).await.unwrap().id().to_string();
        queue.mark_failed(&id, "all 3 backends failed").await.unwrap();
        assert_eq!(queue.summary().await.unwrap().failed, 1);

        let retry = queue.enqueue(&pdf, 12, Utc::now()).await.unwrap();
        assert_eq!(retry, EnqueueResult::ResetForRetry(id.clone()));

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retry_count, 1);
        assert!(pending[0].error.is_none());
    }

    #[tokio::test]
    async fn test_unknown_item_rejected() {
        let temp = TempDir::new().unwrap();
        let queue = queue_in(&temp);
        assert!(matches!(
            queue.mark_failed("deadbeef", "x").await,
            Err(InboxQueueError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_hash_is_stable() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("x.pdf");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let hash = compute_file_hash(&path).await.unwrap();
        assert_eq!(hash, "2cf24dba5fb0a30e");
    }
}
