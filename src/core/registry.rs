//! Backend capability registry.
//!
//! Holds, per task type, the ordered list of backends the orchestrator tries.
//! Registration happens once at startup; afterwards the registry is shared
//! read-only behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backends::Backend;
use crate::domain::TaskType;

/// A registered backend with its priority rank (lower tries first)
#[derive(Clone)]
pub struct BackendDescriptor {
    pub backend: Arc<dyn Backend>,
    pub priority: u32,
}

impl BackendDescriptor {
    pub fn new(backend: Arc<dyn Backend>, priority: u32) -> Self {
        Self { backend, priority }
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn task(&self) -> TaskType {
        self.backend.task()
    }
}

impl std::fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("name", &self.name())
            .field("task", &self.task())
            .field("priority", &self.priority)
            .finish()
    }
}

/// Ordered backends per task type
#[derive(Debug, Default, Clone)]
pub struct BackendRegistry {
    backends: HashMap<TaskType, Vec<BackendDescriptor>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend.
    ///
    /// A backend with the same (task, name) replaces the earlier entry, so
    /// repeated initialization is idempotent. Entries with equal priority keep
    /// their registration order.
    pub fn register(&mut self, descriptor: BackendDescriptor) {
        let entries = self.backends.entry(descriptor.task()).or_default();

        match entries.iter().position(|d| d.name() == descriptor.name()) {
            Some(idx) => entries[idx] = descriptor,
            None => entries.push(descriptor),
        }

        entries.sort_by_key(|d| d.priority);
    }

    /// Register a backend with the next free priority for its task
    pub fn register_next(&mut self, backend: Arc<dyn Backend>) {
        let priority = self
            .backends
            .get(&backend.task())
            .and_then(|entries| entries.iter().map(|d| d.priority).max())
            .map(|p| p + 1)
            .unwrap_or(0);
        self.register(BackendDescriptor::new(backend, priority));
    }

    /// Backends for a task, in the order they should be tried
    pub fn list(&self, task: TaskType) -> &[BackendDescriptor] {
        self.backends.get(&task).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Backend names for a task, in try order
    pub fn names(&self, task: TaskType) -> Vec<String> {
        self.list(task).iter().map(|d| d.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.values().all(Vec::is_empty)
    }

    /// Total number of registered backends
    pub fn len(&self) -> usize {
        self.backends.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::Backend;
    use crate::domain::{ExtractionRequest, Payload};
    use anyhow::Result;
    use async_trait::async_trait;

    struct Named(&'static str, TaskType);

    #[async_trait]
    impl Backend for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn task(&self) -> TaskType {
            self.1
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }

        async fn invoke(&self, _request: &ExtractionRequest) -> Result<Payload> {
            Ok(Payload::Vector(vec![1.0]))
        }
    }

    fn descriptor(name: &'static str, task: TaskType, priority: u32) -> BackendDescriptor {
        BackendDescriptor::new(Arc::new(Named(name, task)), priority)
    }

    #[test]
    fn test_list_orders_by_priority() {
        let mut registry = BackendRegistry::new();
        registry.register(descriptor("tesseract", TaskType::PdfText, 2));
        registry.register(descriptor("pdftotext", TaskType::PdfText, 0));
        registry.register(descriptor("tika", TaskType::PdfText, 1));

        assert_eq!(
            registry.names(TaskType::PdfText),
            vec!["pdftotext", "tika", "tesseract"]
        );
        assert!(registry.list(TaskType::Embedding).is_empty());
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut registry = BackendRegistry::new();
        registry.register(descriptor("pseudo", TaskType::Embedding, 5));
        registry.register(descriptor("openai", TaskType::Embedding, 1));
        registry.register(descriptor("pseudo", TaskType::Embedding, 0));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(TaskType::Embedding), vec!["pseudo", "openai"]);
    }

    #[test]
    fn test_same_name_different_task_is_distinct() {
        let mut registry = BackendRegistry::new();
        registry.register(descriptor("whisper", TaskType::SpeechToText, 0));
        registry.register(descriptor("whisper", TaskType::TextToSpeech, 0));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_equal_priority_keeps_registration_order() {
        let mut registry = BackendRegistry::new();
        registry.register(descriptor("b", TaskType::TextToSpeech, 1));
        registry.register(descriptor("a", TaskType::TextToSpeech, 1));
        assert_eq!(registry.names(TaskType::TextToSpeech), vec!["b", "a"]);
    }

    #[test]
    fn test_register_next_appends() {
        let mut registry = BackendRegistry::new();
        registry.register_next(Arc::new(Named("first", TaskType::PdfText)));
        registry.register_next(Arc::new(Named("second", TaskType::PdfText)));
        let priorities: Vec<u32> = registry
            .list(TaskType::PdfText)
            .iter()
            .map(|d| d.priority)
            .collect();
        assert_eq!(priorities, vec![0, 1]);
    }
}
