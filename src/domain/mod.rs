//! Domain types for the ingestion pipeline.
//!
//! This module contains the core data structures:
//! - Task: what a backend is asked to do, and with what input
//! - Result: what a backend hands back
//! - Records: what ends up in the store

pub mod records;
pub mod result;
pub mod task;

// Re-export commonly used types
pub use records::{
    ClassifiedCommand, Document, Intent, LearnedPattern, LedgerEntry, NewDocument, Sentiment,
};
pub use result::{
    AttemptFailure, AudioClip, ExtractedText, FailedAttempt, Payload, RawResult, Transcript,
};
pub use task::{ExtractionRequest, RequestOptions, Source, TaskType};
