//! ingestor - Resilient multi-backend ingestion pipeline
//!
//! Turns PDFs, speech and voice commands into stored, searchable records.
//! Every capability (PDF text, speech-to-text, text-to-speech, embeddings)
//! is served by several interchangeable backends tried in priority order.
//!
//! # Architecture
//!
//! The system is built around one generic fallback engine:
//! - Backends implement a single trait and declare the task they serve
//! - The registry orders backends per task
//! - The orchestrator tries them in order, isolating each attempt under a
//!   timeout and recording why every skipped backend failed
//!
//! # Modules
//!
//! - `backends`: CLI and HTTP backend adapters (pdftotext, Tika, whisper, ...)
//! - `core`: Registry, orchestrator, limits, embedder and classifier
//! - `domain`: Requests, payloads and stored records
//! - `pipeline`: PDF, voice, embedding and speech flows
//! - `store`: SQLite persistence
//! - `inbox`: PDF inbox queue and watcher
//! - `server`: HTTP API
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Serve the HTTP API
//! ingestor serve --bind 127.0.0.1:8000
//!
//! # Ingest a PDF
//! ingestor pdf ~/Downloads/catalog.pdf
//!
//! # Process a voice command
//! ingestor voice "go to the dashboard"
//! ```

pub mod backends;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod inbox;
pub mod pipeline;
pub mod server;
pub mod store;

// Re-export main types at crate root for convenience
pub use backends::Backend;
pub use core::{BackendRegistry, Orchestrator};
pub use domain::{ExtractionRequest, Payload, RawResult, TaskType};
pub use inbox::{InboxQueue, InboxWatcher};
pub use pipeline::{AppContext, IngestError, Ingestor};
pub use store::Store;
