//! PDF inbox ingestion.
//!
//! ```text
//! inbox dir → Watcher (stable files) → Queue (content hash) → Ingestor
//!                                        ↓
//!                               inbox_queue.jsonl
//! ```

pub mod queue;
pub mod watcher;

pub use queue::{
    compute_file_hash, EnqueueResult, InboxFile, InboxItem, InboxQueue, InboxQueueError,
    InboxStatus, InboxSummary,
};
pub use watcher::{InboxWatcher, ScanReport, WatchHandle};
