//! Processed documents.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};

use crate::domain::{Document, NewDocument};

use super::queue::enqueue_embedding;
use super::{decode_vector, encode_vector, format_timestamp, parse_timestamp, Store, StoreError};

const DOCUMENT_COLUMNS: &str = "id, source_file, source_type, content, parsed_by, page_count, \
     table_count, truncated, embedding, created_at";

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    let embedding: Option<Vec<u8>> = row.get(8)?;
    let created_at: String = row.get(9)?;
    let table_count: i64 = row.get(6)?;

    Ok(Document {
        id: row.get(0)?,
        source_file: row.get(1)?,
        source_type: row.get(2)?,
        content: row.get(3)?,
        parsed_by: row.get(4)?,
        page_count: row.get(5)?,
        table_count: table_count.max(0) as usize,
        truncated: row.get(7)?,
        embedding: embedding.map(|blob| decode_vector(&blob)),
        created_at: parse_timestamp(9, &created_at)?,
    })
}

impl Store {
    /// Persist a document, returning it with its id
    pub fn insert_document(&self, document: &NewDocument) -> Result<Document, StoreError> {
        self.insert_document_with_queue(document, false)
            .map(|(document, _)| document)
    }

    /// Persist a document and, when `queue` is set, its embedding job in one
    /// transaction. Returns the document and whether a job was queued.
    pub fn insert_document_with_queue(
        &self,
        document: &NewDocument,
        queue: bool,
    ) -> Result<(Document, bool), StoreError> {
        let created_at = Utc::now();
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO documents (source_file, source_type, content, parsed_by, page_count, \
             table_count, truncated, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                document.source_file,
                document.source_type,
                document.content,
                document.parsed_by,
                document.page_count,
                document.table_count as i64,
                document.truncated,
                format_timestamp(&created_at),
            ],
        )?;
        let id = tx.last_insert_rowid();
        let queued = queue && enqueue_embedding(&tx, id)?;
        tx.commit()?;

        let document = Document {
            id,
            source_file: document.source_file.clone(),
            source_type: document.source_type.clone(),
            content: document.content.clone(),
            parsed_by: document.parsed_by.clone(),
            page_count: document.page_count,
            table_count: document.table_count,
            truncated: document.truncated,
            embedding: None,
            created_at,
        };
        Ok((document, queued))
    }

    pub fn get_document(&self, id: i64) -> Result<Option<Document>, StoreError> {
        let conn = self.lock()?;
        let document = conn
            .query_row(
                &format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS),
                [id],
                row_to_document,
            )
            .optional()?;
        Ok(document)
    }

    /// Most recent documents first
    pub fn recent_documents(&self, limit: usize) -> Result<Vec<Document>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM documents ORDER BY id DESC LIMIT ?1",
            DOCUMENT_COLUMNS
        ))?;
        let documents = stmt
            .query_map([limit as i64], row_to_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(documents)
    }

    /// Attach an embedding to a document
    pub fn set_document_embedding(&self, id: i64, embedding: &[f32]) -> Result<(), StoreError> {
        self.check_dimension(embedding)?;
        let conn = self.lock()?;
        conn.execute(
            "UPDATE documents SET embedding = ?1 WHERE id = ?2",
            params![encode_vector(embedding), id],
        )?;
        Ok(())
    }
}
