//! SQLite persistence.
//!
//! One database holds processed documents, the voice interaction ledger,
//! embedded voice commands, learned patterns and the embedding queue.
//! The connection runs in WAL mode with a busy timeout so several handles
//! (server, CLI, inbox watcher) can share the file.

mod documents;
mod queue;
mod voice;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;
use thiserror::Error;
use tracing::debug;

pub use queue::{EmbeddingJob, QueueCounts};
pub use voice::{pattern_key, SavedInteraction};

/// Schema version recorded in `schema_meta`
pub const SCHEMA_VERSION: u32 = 1;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedding has {actual} dimensions, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("database connection lock poisoned")]
    LockPoisoned,
}

/// A stored vector with what it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedRecord {
    /// "command" or "document"
    pub kind: &'static str,
    pub id: i64,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// SQLite-backed store
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    dimension: usize,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl Store {
    /// Open or create the database at `path`
    pub fn open(path: impl AsRef<Path>, dimension: usize) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_path_buf(),
            dimension,
        };
        store.init_schema()?;
        debug!(path = %path.display(), "Opened store");
        Ok(store)
    }

    /// In-memory database (tests, one-shot CLI runs)
    pub fn open_in_memory(dimension: usize) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
            dimension,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Vector length every stored embedding must have
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_file TEXT NOT NULL,
                source_type TEXT NOT NULL,
                content TEXT NOT NULL,
                parsed_by TEXT NOT NULL,
                page_count INTEGER,
                table_count INTEGER NOT NULL DEFAULT 0,
                truncated INTEGER NOT NULL DEFAULT 0,
                embedding BLOB,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS interaction_ledger (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_type TEXT NOT NULL,
                raw_transcript TEXT NOT NULL,
                intent TEXT NOT NULL,
                sentiment TEXT NOT NULL,
                page_route TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS voice_commands (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ledger_id INTEGER NOT NULL REFERENCES interaction_ledger(id),
                raw_text TEXT NOT NULL,
                intent TEXT NOT NULL,
                sentiment TEXT NOT NULL,
                embedding BLOB NOT NULL,
                page_context TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS learned_patterns (
                pattern_text TEXT PRIMARY KEY,
                pattern_type TEXT NOT NULL,
                occurrence_count INTEGER NOT NULL,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS embedding_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL UNIQUE REFERENCES documents(id),
                status TEXT NOT NULL DEFAULT 'pending',
                error TEXT,
                created_at TEXT NOT NULL,
                processed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_queue_status ON embedding_queue(status);
            CREATE INDEX IF NOT EXISTS idx_patterns_count ON learned_patterns(occurrence_count);
            CREATE INDEX IF NOT EXISTS idx_ledger_created ON interaction_ledger(created_at);
            "#,
        )?;

        conn.execute(
            "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('version', ?1)",
            [SCHEMA_VERSION.to_string()],
        )?;

        Ok(())
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), StoreError> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Every stored vector (voice commands, then documents)
    pub fn embedded_records(&self) -> Result<Vec<EmbeddedRecord>, StoreError> {
        let conn = self.lock()?;
        let mut records = Vec::new();

        let mut stmt = conn.prepare("SELECT id, raw_text, embedding FROM voice_commands ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            let blob: Vec<u8> = row.get(2)?;
            Ok(EmbeddedRecord {
                kind: "command",
                id: row.get(0)?,
                text: row.get(1)?,
                embedding: decode_vector(&blob),
            })
        })?;
        for row in rows {
            records.push(row?);
        }

        let mut stmt = conn.prepare(
            "SELECT id, content, embedding FROM documents WHERE embedding IS NOT NULL ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            let blob: Vec<u8> = row.get(2)?;
            Ok(EmbeddedRecord {
                kind: "document",
                id: row.get(0)?,
                text: row.get(1)?,
                embedding: decode_vector(&blob),
            })
        })?;
        for row in rows {
            records.push(row?);
        }

        Ok(records)
    }
}

/// Little-endian f32 blob
pub(crate) fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_enum<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    value.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}
