//! Voice interaction ledger, embedded commands and learned patterns.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::domain::{ClassifiedCommand, LearnedPattern, LedgerEntry};

use super::{encode_vector, format_timestamp, parse_enum, parse_timestamp, Store, StoreError};

const PATTERN_UPSERT: &str = "INSERT INTO learned_patterns \
     (pattern_text, pattern_type, occurrence_count, first_seen, last_seen) \
     VALUES (?1, ?2, 1, ?3, ?3) \
     ON CONFLICT(pattern_text) DO UPDATE SET \
     occurrence_count = occurrence_count + 1, last_seen = excluded.last_seen \
     RETURNING pattern_text, pattern_type, occurrence_count, first_seen, last_seen";

/// Normalized pattern key: lowercase, cut at `max_chars` characters
pub fn pattern_key(text: &str, max_chars: usize) -> String {
    text.to_lowercase().chars().take(max_chars).collect()
}

/// Ids written for one voice interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedInteraction {
    pub ledger_id: i64,
    /// Only set when the command carried an embedding
    pub command_id: Option<i64>,
    pub pattern: LearnedPattern,
}

fn row_to_pattern(row: &Row<'_>) -> rusqlite::Result<LearnedPattern> {
    let count: i64 = row.get(2)?;
    let first_seen: String = row.get(3)?;
    let last_seen: String = row.get(4)?;
    Ok(LearnedPattern {
        pattern_text: row.get(0)?,
        pattern_type: row.get(1)?,
        occurrence_count: count.max(0) as u64,
        first_seen: parse_timestamp(3, &first_seen)?,
        last_seen: parse_timestamp(4, &last_seen)?,
    })
}

fn row_to_ledger(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let intent: String = row.get(3)?;
    let sentiment: String = row.get(4)?;
    let created_at: String = row.get(6)?;
    Ok(LedgerEntry {
        id: row.get(0)?,
        user_type: row.get(1)?,
        raw_transcript: row.get(2)?,
        intent: parse_enum(3, &intent)?,
        sentiment: parse_enum(4, &sentiment)?,
        page_route: row.get(5)?,
        created_at: parse_timestamp(6, &created_at)?,
    })
}

fn upsert_pattern(conn: &Connection, key: &str, pattern_type: &str) -> rusqlite::Result<LearnedPattern> {
    let now = format_timestamp(&Utc::now());
    conn.query_row(PATTERN_UPSERT, params![key, pattern_type, now], row_to_pattern)
}

impl Store {
    /// Count one occurrence of `text`.
    ///
    /// A single upsert statement, so concurrent callers never lose updates.
    /// The pattern type sticks to the first recorded value.
    pub fn record_pattern(
        &self,
        text: &str,
        pattern_type: &str,
        key_chars: usize,
    ) -> Result<LearnedPattern, StoreError> {
        let key = pattern_key(text, key_chars);
        let conn = self.lock()?;
        Ok(upsert_pattern(&conn, &key, pattern_type)?)
    }

    pub fn get_pattern(&self, text: &str, key_chars: usize) -> Result<Option<LearnedPattern>, StoreError> {
        let key = pattern_key(text, key_chars);
        let conn = self.lock()?;
        let pattern = conn
            .query_row(
                "SELECT pattern_text, pattern_type, occurrence_count, first_seen, last_seen \
                 FROM learned_patterns WHERE pattern_text = ?1",
                [key],
                row_to_pattern,
            )
            .optional()?;
        Ok(pattern)
    }

    /// Most frequent patterns first
    pub fn top_patterns(&self, limit: usize) -> Result<Vec<LearnedPattern>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT pattern_text, pattern_type, occurrence_count, first_seen, last_seen \
             FROM learned_patterns ORDER BY occurrence_count DESC, last_seen DESC LIMIT ?1",
        )?;
        let patterns = stmt
            .query_map([limit as i64], row_to_pattern)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(patterns)
    }

    /// Persist one voice interaction atomically.
    ///
    /// Always writes a ledger entry and bumps the learned pattern; the command
    /// row is only written when an embedding was produced.
    pub fn save_voice_interaction(
        &self,
        user_type: &str,
        command: &ClassifiedCommand,
        key_chars: usize,
    ) -> Result<SavedInteraction, StoreError> {
        if let Some(embedding) = &command.embedding {
            self.check_dimension(embedding)?;
        }

        let now = format_timestamp(&Utc::now());
        let key = pattern_key(&command.raw_text, key_chars);

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO interaction_ledger \
             (user_type, raw_transcript, intent, sentiment, page_route, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_type,
                command.raw_text,
                command.intent.as_str(),
                command.sentiment.as_str(),
                command.page_context,
                now,
            ],
        )?;
        let ledger_id = tx.last_insert_rowid();

        let command_id = match &command.embedding {
            Some(embedding) => {
                tx.execute(
                    "INSERT INTO voice_commands \
                     (ledger_id, raw_text, intent, sentiment, embedding, page_context, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        ledger_id,
                        command.raw_text,
                        command.intent.as_str(),
                        command.sentiment.as_str(),
                        encode_vector(embedding),
                        command.page_context,
                        now,
                    ],
                )?;
                Some(tx.last_insert_rowid())
            }
            None => None,
        };

        let pattern = upsert_pattern(&tx, &key, command.intent.as_str())?;
        tx.commit()?;

        Ok(SavedInteraction {
            ledger_id,
            command_id,
            pattern,
        })
    }

    pub fn get_ledger_entry(&self, id: i64) -> Result<Option<LedgerEntry>, StoreError> {
        let conn = self.lock()?;
        let entry = conn
            .query_row(
                "SELECT id, user_type, raw_transcript, intent, sentiment, page_route, created_at \
                 FROM interaction_ledger WHERE id = ?1",
                [id],
                row_to_ledger,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn ledger_count(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM interaction_ledger", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    pub fn command_count(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM voice_commands", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Intent, Sentiment};

    fn command(text: &str, embedding: Option<Vec<f32>>) -> ClassifiedCommand {
        ClassifiedCommand {
            raw_text: text.to_string(),
            intent: Intent::Navigation,
            sentiment: Sentiment::Neutral,
            embedding,
            page_context: "/inventory".to_string(),
        }
    }

    #[test]
    fn test_pattern_key_counts_chars() {
        let text = "É".repeat(150);
        let key = pattern_key(&text, 100);
        assert_eq!(key.chars().count(), 100);
        assert_eq!(key, "é".repeat(100));
    }

    #[test]
    fn test_record_pattern_increments() {
        let store = Store::open_in_memory(4).unwrap();

        let first = store.record_pattern("Go Home", "navigation", 100).unwrap();
        assert_eq!(first.occurrence_count, 1);
        assert_eq!(first.pattern_text, "go home");

        let second = store.record_pattern("go home", "query", 100).unwrap();
        assert_eq!(second.occurrence_count, 2);
        assert_eq!(second.pattern_type, "navigation");
        assert_eq!(second.first_seen, first.first_seen);
        assert!(second.last_seen >= first.last_seen);
    }

    #[test]
    fn test_interaction_without_embedding_skips_command() {
        let store = Store::open_in_memory(4).unwrap();
        let saved = store
            .save_voice_interaction("boss", &command("open orders", None), 100)
            .unwrap();

        assert!(saved.command_id.is_none());
        assert_eq!(store.ledger_count().unwrap(), 1);
        assert_eq!(store.command_count().unwrap(), 0);

        let entry = store.get_ledger_entry(saved.ledger_id).unwrap().unwrap();
        assert_eq!(entry.intent, Intent::Navigation);
        assert_eq!(entry.page_route, "/inventory");
    }

    #[test]
    fn test_interaction_with_embedding_writes_command() {
        let store = Store::open_in_memory(4).unwrap();
        let saved = store
            .save_voice_interaction("boss", &command("open orders", Some(vec![0.5; 4])), 100)
            .unwrap();

        assert!(saved.command_id.is_some());
        assert_eq!(saved.pattern.occurrence_count, 1);
        assert_eq!(store.embedded_records().unwrap().len(), 1);
    }

    #[test]
    fn test_wrong_dimension_rejected_before_write() {
        let store = Store::open_in_memory(4).unwrap();
        let result = store.save_voice_interaction("boss", &command("x", Some(vec![1.0])), 100);

        assert!(matches!(result, Err(StoreError::DimensionMismatch { .. })));
        assert_eq!(store.ledger_count().unwrap(), 0);
    }

    #[test]
    fn test_top_patterns_ordering() {
        let store = Store::open_in_memory(4).unwrap();
        for _ in 0..3 {
            store.record_pattern("find tiles", "query", 100).unwrap();
        }
        store.record_pattern("stop", "control", 100).unwrap();

        let top = store.top_patterns(10).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].pattern_text, "find tiles");
        assert_eq!(top[0].occurrence_count, 3);
    }
}
