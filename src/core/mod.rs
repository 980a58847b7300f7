//! Core ingestion logic.
//!
//! This module contains:
//! - Registry: ordered backends per task type
//! - Orchestrator: fallback execution across backends
//! - Limits: input validation before any backend runs
//! - Embedder: deterministic pseudo embeddings and cosine similarity
//! - Classifier: keyword intent and sentiment rules

pub mod classifier;
pub mod embedder;
pub mod limits;
pub mod orchestrator;
pub mod registry;

// Re-export commonly used types
pub use classifier::classify;
pub use embedder::cosine_similarity;
pub use limits::{InputLimits, ValidationError};
pub use orchestrator::{
    AllBackendsFailed, BackendStatus, Orchestrator, OrchestratorError, TimeoutPolicy,
};
pub use registry::{BackendDescriptor, BackendRegistry};
