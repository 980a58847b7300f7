//! Ingestion pipeline.
//!
//! [`AppContext`] builds the long-lived handles once (backend registry,
//! orchestrator, store); [`Ingestor`] runs the PDF, voice, embedding and
//! speech flows on top of them.

mod ingestor;

use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::info;

use crate::backends;
use crate::config::ResolvedConfig;
use crate::core::{
    AllBackendsFailed, BackendRegistry, Orchestrator, OrchestratorError, ValidationError,
};
use crate::store::{Store, StoreError};

pub use ingestor::{
    BackendHealth, EmbeddingOutcome, HealthReport, Ingestor, PdfIngestion, QueueReport,
    SearchHit, SpeechOutcome, TranscriptionOutcome, VoiceInput, VoiceOutcome,
};

/// Errors surfaced by pipeline operations
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    AllBackendsFailed(#[from] AllBackendsFailed),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<OrchestratorError> for IngestError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Validation(e) => IngestError::Validation(e),
            OrchestratorError::AllBackendsFailed(e) => IngestError::AllBackendsFailed(e),
        }
    }
}

/// Long-lived handles shared by every request
pub struct AppContext {
    pub config: ResolvedConfig,
    pub orchestrator: Orchestrator,
    pub store: Store,
}

impl AppContext {
    /// Build the registry from config, open the store and wire the orchestrator
    pub fn initialize(config: ResolvedConfig) -> Result<Self> {
        let registry = backends::bootstrap(&config);
        let store = Store::open(&config.database, config.embedding.dimension)
            .with_context(|| format!("Failed to open store at {}", config.database.display()))?;

        info!(
            database = %config.database.display(),
            backends = registry.len(),
            dimension = config.embedding.dimension,
            "Initialized ingestion context"
        );

        Ok(Self::from_parts(config, registry, store))
    }

    /// Assemble a context from an explicit registry and store
    pub fn from_parts(config: ResolvedConfig, registry: BackendRegistry, store: Store) -> Self {
        let orchestrator = Orchestrator::new(
            Arc::new(registry),
            config.limits.clone(),
            config.backends.timeout_policy(),
        );
        Self {
            config,
            orchestrator,
            store,
        }
    }

    pub fn ingestor(self) -> Ingestor {
        Ingestor::new(Arc::new(self))
    }
}
