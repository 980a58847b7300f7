//! Inbox directory watcher.
//!
//! Scans (or watches) a directory for incoming PDFs, tracks them in the
//! [`InboxQueue`] and ingests pending items through the pipeline. A file is
//! only picked up once its size has been stable for the configured delay.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::InboxSettings;
use crate::pipeline::Ingestor;

use super::queue::{EnqueueResult, InboxQueue};

/// Result of one scan pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub new_files: usize,
    pub already_queued: usize,
    pub already_ingested: usize,
    pub reset_for_retry: usize,
    pub ingested: usize,
    pub failed: usize,
    pub errors: usize,
}

impl ScanReport {
    pub fn total_scanned(&self) -> usize {
        self.new_files + self.already_queued + self.already_ingested + self.reset_for_retry
    }
}

/// Watches an inbox directory and ingests PDFs
pub struct InboxWatcher {
    dir: PathBuf,
    settings: InboxSettings,
    queue: InboxQueue,
    ingestor: Ingestor,
}

impl InboxWatcher {
    pub fn new(
        dir: impl Into<PathBuf>,
        settings: InboxSettings,
        queue: InboxQueue,
        ingestor: Ingestor,
    ) -> Self {
        Self {
            dir: dir.into(),
            settings,
            queue,
            ingestor,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn queue(&self) -> &InboxQueue {
        &self.queue
    }

    fn is_watched_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.settings.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    /// Enqueue every matching file in the directory, then ingest pending items
    pub async fn scan_once(&self) -> Result<ScanReport> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create inbox {}", self.dir.display()))?;

        let mut report = ScanReport::default();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !self.is_watched_file(&path) {
                continue;
            }
            let metadata = match tokio::fs::metadata(&path).await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };

            self.enqueue(&path, metadata.len(), &mut report).await;
        }

        self.process_pending(&mut report).await;
        Ok(report)
    }

    async fn enqueue(&self, path: &Path, size: u64, report: &mut ScanReport) {
        match self.queue.enqueue(path, size, Utc::now()).await {
            Ok(EnqueueResult::Queued(id)) => {
                debug!(id = %id, path = %path.display(), "Queued PDF");
                report.new_files += 1;
            }
            Ok(EnqueueResult::AlreadyQueued(_)) => report.already_queued += 1,
            Ok(EnqueueResult::AlreadyIngested(_)) => report.already_ingested += 1,
            Ok(EnqueueResult::ResetForRetry(_)) => report.reset_for_retry += 1,
            Err(e) => {
                warn!("Failed to enqueue {}: {}", path.display(), e);
                report.errors += 1;
            }
        }
    }

    /// Enqueue the given files, then ingest pending items
    async fn ingest_files(&self, files: Vec<(PathBuf, u64)>) -> ScanReport {
        let mut report = ScanReport::default();
        for (path, size) in files {
            self.enqueue(&path, size, &mut report).await;
        }
        self.process_pending(&mut report).await;
        report
    }

    /// Ingest every pending item. Queue errors are counted, never fatal.
    async fn process_pending(&self, report: &mut ScanReport) {
        let pending = match self.queue.pending().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(queue = %self.queue.path().display(), error = %e, "Failed to read inbox queue");
                report.errors += 1;
                return;
            }
        };

        for item in pending {
            let recorded = match self.ingestor.ingest_pdf(&item.file.path).await {
                Ok(ingestion) => {
                    report.ingested += 1;
                    self.queue
                        .mark_ingested(
                            &item.id,
                            ingestion.document.id,
                            &ingestion.document.parsed_by,
                        )
                        .await
                }
                Err(e) => {
                    warn!(file = %item.file.file_name, error = %e, "Inbox ingestion failed");
                    report.failed += 1;
                    self.queue.mark_failed(&item.id, &e.to_string()).await
                }
            };

            if let Err(e) = recorded {
                warn!(id = %item.id, error = %e, "Failed to record inbox result");
                report.errors += 1;
            }
        }
    }

    /// Scan once, then watch for new stable files until stopped
    pub async fn watch(self: Arc<Self>) -> Result<WatchHandle> {
        let initial = self.scan_once().await?;
        info!(
            dir = %self.dir.display(),
            ingested = initial.ingested,
            failed = initial.failed,
            "Initial inbox scan complete"
        );

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            if let Err(e) = self.run(stop_rx).await {
                error!("Inbox watcher error: {:#}", e);
            }
        });

        Ok(WatchHandle { stop_tx, task })
    }

    async fn run(&self, mut stop_rx: oneshot::Receiver<()>) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<DebounceEventResult>();
        let mut debouncer = new_debouncer(Duration::from_secs(2), move |result| {
            let _ = tx.send(result);
        })?;
        debouncer
            .watcher()
            .watch(&self.dir, RecursiveMode::NonRecursive)?;

        let stability_delay = Duration::from_secs(self.settings.stability_delay_secs);
        let mut tracked: HashMap<PathBuf, (u64, Instant)> = HashMap::new();
        let mut tick = tokio::time::interval(Duration::from_millis(500));

        info!(dir = %self.dir.display(), "Watching inbox for PDFs");

        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    info!("Inbox watcher stopping");
                    break;
                }
                received = rx.recv() => match received {
                    Some(Ok(events)) => {
                        for event in events {
                            if !self.is_watched_file(&event.path) {
                                continue;
                            }
                            if let Ok(metadata) = std::fs::metadata(&event.path) {
                                if metadata.is_file() {
                                    tracked.insert(event.path, (metadata.len(), Instant::now()));
                                }
                            }
                        }
                    }
                    Some(Err(e)) => warn!("Inbox watch error: {:?}", e),
                    None => {
                        error!("Inbox watch channel closed");
                        break;
                    }
                },
                _ = tick.tick() => {
                    let stable = take_stable(&mut tracked, stability_delay);
                    if stable.is_empty() {
                        continue;
                    }

                    let report = self.ingest_files(stable).await;
                    info!(
                        new_files = report.new_files,
                        ingested = report.ingested,
                        failed = report.failed,
                        errors = report.errors,
                        "Processed inbox changes"
                    );
                }
            }
        }

        Ok(())
    }
}

/// Remove and return files whose size has not changed for `delay`
fn take_stable(tracked: &mut HashMap<PathBuf, (u64, Instant)>, delay: Duration) -> Vec<(PathBuf, u64)> {
    let now = Instant::now();
    let mut stable = Vec::new();

    tracked.retain(|path, (last_size, last_seen)| {
        if now.duration_since(*last_seen) < delay {
            return true;
        }
        match std::fs::metadata(path) {
            Ok(metadata) if metadata.len() == *last_size && *last_size > 0 => {
                stable.push((path.clone(), *last_size));
                false
            }
            Ok(metadata) => {
                // Still growing; restart the stability window
                *last_size = metadata.len();
                *last_seen = now;
                true
            }
            Err(_) => false,
        }
    });

    stable
}

/// Handle to stop a running watcher
pub struct WatchHandle {
    stop_tx: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl WatchHandle {
    pub async fn stop(self) -> Result<()> {
        let _ = self.stop_tx.send(());
        self.task.await?;
        Ok(())
    }
}
