//! Fallback orchestrator.
//!
//! Tries the registered backends for a task strictly in priority order and
//! returns the first usable result. Each attempt runs in its own task under a
//! per-backend timeout, so a backend that errors, panics, hangs or returns an
//! empty payload is recorded and skipped without affecting the next one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{
    AttemptFailure, ExtractionRequest, FailedAttempt, Payload, RawResult, TaskType,
};

use super::limits::{InputLimits, ValidationError};
use super::registry::{BackendDescriptor, BackendRegistry};

/// Every backend for a task failed (or none is registered)
#[derive(Debug, Clone, Error)]
#[error("{}", summarize(.task, .attempts))]
pub struct AllBackendsFailed {
    pub task: TaskType,
    pub attempts: Vec<FailedAttempt>,
}

fn summarize(task: &TaskType, attempts: &[FailedAttempt]) -> String {
    if attempts.is_empty() {
        return format!("no backends registered for {}", task);
    }
    let reasons: Vec<String> = attempts
        .iter()
        .map(|a| format!("{} ({})", a.backend, a.reason))
        .collect();
    format!(
        "all {} backends failed for {}: {}",
        attempts.len(),
        task,
        reasons.join("; ")
    )
}

/// Errors that cross the orchestrator boundary
#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    AllBackendsFailed(#[from] AllBackendsFailed),
}

/// Per-backend timeouts
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    pub default: Duration,
    pub overrides: HashMap<String, Duration>,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(300),
            overrides: HashMap::new(),
        }
    }
}

impl TimeoutPolicy {
    pub fn new(default: Duration) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, backend: impl Into<String>, timeout: Duration) -> Self {
        self.overrides.insert(backend.into(), timeout);
        self
    }

    /// Effective timeout for a backend
    pub fn for_backend(&self, name: &str) -> Duration {
        self.overrides.get(name).copied().unwrap_or(self.default)
    }
}

/// Availability of a single backend, as reported by its probe
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub task: TaskType,
    pub name: String,
    pub priority: u32,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Generic fallback engine shared by every task type
pub struct Orchestrator {
    registry: Arc<BackendRegistry>,
    limits: InputLimits,
    timeouts: TimeoutPolicy,
}

impl Orchestrator {
    pub fn new(registry: Arc<BackendRegistry>, limits: InputLimits, timeouts: TimeoutPolicy) -> Self {
        Self {
            registry,
            limits,
            timeouts,
        }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn limits(&self) -> &InputLimits {
        &self.limits
    }

    /// Run a request through the fallback chain for its task
    #[instrument(skip(self, request), fields(task = %request.task, source = %request.source.describe()))]
    pub async fn execute(&self, request: ExtractionRequest) -> Result<RawResult, OrchestratorError> {
        self.limits.validate(&request)?;

        let task = request.task;
        let request = Arc::new(request);
        let mut failures: Vec<FailedAttempt> = Vec::new();

        for descriptor in self.registry.list(task) {
            let started = Instant::now();

            match self.attempt(descriptor, Arc::clone(&request)).await {
                Ok(payload) => {
                    info!(
                        backend = %descriptor.name(),
                        duration_ms = started.elapsed().as_millis() as u64,
                        skipped = failures.len(),
                        "Backend produced result"
                    );
                    return Ok(RawResult {
                        payload,
                        backend: descriptor.name().to_string(),
                        failures,
                    });
                }
                Err(reason) => {
                    warn!(
                        backend = %descriptor.name(),
                        error = %reason,
                        "Backend attempt failed, trying next"
                    );
                    failures.push(FailedAttempt {
                        backend: descriptor.name().to_string(),
                        reason,
                    });
                }
            }
        }

        error!(attempts = failures.len(), "All backends failed");
        Err(AllBackendsFailed {
            task,
            attempts: failures,
        }
        .into())
    }

    /// One isolated attempt: probe, then invoke, both within one deadline
    async fn attempt(
        &self,
        descriptor: &BackendDescriptor,
        request: Arc<ExtractionRequest>,
    ) -> Result<Payload, AttemptFailure> {
        let limit = self.timeouts.for_backend(descriptor.name());
        let deadline = tokio::time::Instant::now() + limit;

        if let Err(reason) = probe(descriptor, limit).await {
            return Err(AttemptFailure::Unavailable(reason));
        }
        debug!(backend = %descriptor.name(), "Backend available");

        let backend = Arc::clone(&descriptor.backend);
        let handle = tokio::spawn(async move { backend.invoke(&request).await });
        let abort = handle.abort_handle();

        let payload = match tokio::time::timeout_at(deadline, handle).await {
            Err(_) => {
                abort.abort();
                return Err(AttemptFailure::TimedOut(limit.as_millis() as u64));
            }
            Ok(Err(join_error)) => {
                return Err(AttemptFailure::InvocationFailed(if join_error.is_panic() {
                    "backend panicked".to_string()
                } else {
                    join_error.to_string()
                }));
            }
            Ok(Ok(Err(e))) => return Err(AttemptFailure::InvocationFailed(format!("{:#}", e))),
            Ok(Ok(Ok(payload))) => payload,
        };

        if payload.task() != descriptor.task() {
            return Err(AttemptFailure::WrongPayload {
                expected: descriptor.task(),
                actual: payload.kind().to_string(),
            });
        }

        if payload.is_empty() {
            return Err(AttemptFailure::EmptyResult);
        }

        Ok(payload)
    }

    /// Probe every registered backend, in try order per task
    pub async fn availability(&self) -> Vec<BackendStatus> {
        let mut statuses = Vec::new();

        for task in TaskType::ALL {
            for descriptor in self.registry.list(task) {
                let limit = self.timeouts.for_backend(descriptor.name());
                let result = probe(descriptor, limit).await;
                statuses.push(BackendStatus {
                    task,
                    name: descriptor.name().to_string(),
                    priority: descriptor.priority,
                    available: result.is_ok(),
                    reason: result.err(),
                });
            }
        }

        statuses
    }

    /// Whether at least one backend for `task` currently passes its probe
    pub async fn any_available(&self, task: TaskType) -> bool {
        for descriptor in self.registry.list(task) {
            let limit = self.timeouts.for_backend(descriptor.name());
            if probe(descriptor, limit).await.is_ok() {
                return true;
            }
        }
        false
    }
}

/// Run a backend's probe under a timeout, in its own task
async fn probe(descriptor: &BackendDescriptor, limit: Duration) -> Result<(), String> {
    let backend = Arc::clone(&descriptor.backend);
    let handle = tokio::spawn(async move { backend.health_check().await });
    let abort = handle.abort_handle();

    match tokio::time::timeout(limit, handle).await {
        Err(_) => {
            abort.abort();
            Err(format!("probe timed out after {}ms", limit.as_millis()))
        }
        Ok(Err(join_error)) if join_error.is_panic() => Err("probe panicked".to_string()),
        Ok(Err(join_error)) => Err(join_error.to_string()),
        Ok(Ok(Err(e))) => Err(format!("{:#}", e)),
        Ok(Ok(Ok(()))) => Ok(()),
    }
}
