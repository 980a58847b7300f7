//! Document embedding queue.

use chrono::Utc;
use rusqlite::{params, Connection, TransactionBehavior};
use serde::Serialize;

use super::{encode_vector, format_timestamp, Store, StoreError};

/// A pending embedding job
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingJob {
    pub queue_id: i64,
    pub document_id: i64,
    pub content: String,
}

/// Queue size by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,
}

pub(super) fn enqueue_embedding(conn: &Connection, document_id: i64) -> rusqlite::Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO embedding_queue (document_id, status, created_at) \
         VALUES (?1, 'pending', ?2)",
        params![document_id, format_timestamp(&Utc::now())],
    )?;
    Ok(inserted > 0)
}

impl Store {
    /// Queue a document for embedding; a document is queued at most once
    pub fn queue_for_embedding(&self, document_id: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        Ok(enqueue_embedding(&conn, document_id)?)
    }

    /// Oldest pending jobs first
    pub fn pending_embeddings(&self, limit: usize) -> Result<Vec<EmbeddingJob>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT q.id, q.document_id, d.content FROM embedding_queue q \
             JOIN documents d ON d.id = q.document_id \
             WHERE q.status = 'pending' ORDER BY q.id LIMIT ?1",
        )?;
        let jobs = stmt
            .query_map([limit as i64], |row| {
                Ok(EmbeddingJob {
                    queue_id: row.get(0)?,
                    document_id: row.get(1)?,
                    content: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    /// Store the vector on the document and close the job
    pub fn complete_embedding(&self, job: &EmbeddingJob, embedding: &[f32]) -> Result<(), StoreError> {
        self.check_dimension(embedding)?;
        let now = format_timestamp(&Utc::now());

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "UPDATE documents SET embedding = ?1 WHERE id = ?2",
            params![encode_vector(embedding), job.document_id],
        )?;
        tx.execute(
            "UPDATE embedding_queue SET status = 'completed', error = NULL, processed_at = ?1 \
             WHERE id = ?2",
            params![now, job.queue_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn fail_embedding(&self, job: &EmbeddingJob, error: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE embedding_queue SET status = 'failed', error = ?1, processed_at = ?2 \
             WHERE id = ?3",
            params![error, format_timestamp(&Utc::now()), job.queue_id],
        )?;
        Ok(())
    }

    /// Error recorded for a document's job, if it failed
    pub fn embedding_error(&self, document_id: i64) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT error FROM embedding_queue WHERE document_id = ?1 AND status = 'failed'",
        )?;
        let mut rows = stmt.query([document_id])?;
        match rows.next()? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(None),
        }
    }

    pub fn queue_counts(&self) -> Result<QueueCounts, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM embedding_queue GROUP BY status")?;
        let mut rows = stmt.query([])?;

        let mut counts = QueueCounts::default();
        while let Some(row) = rows.next()? {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            let count = count.max(0) as u64;
            match status.as_str() {
                "pending" => counts.pending = count,
                "completed" => counts.completed = count,
                "failed" => counts.failed = count,
                _ => {}
            }
        }
        Ok(counts)
    }
}
