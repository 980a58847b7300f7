//! PDF inbox CLI commands.
//!
//! - `ingestor inbox scan` - Queue and ingest PDFs once
//! - `ingestor inbox watch` - Watch the inbox continuously
//! - `ingestor inbox status` - Show queue status

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::config;
use crate::inbox::{InboxQueue, InboxStatus, InboxWatcher};

use super::open_ingestor;

#[derive(Subcommand, Debug)]
pub enum InboxCommands {
    /// Queue new PDFs in the inbox and ingest pending ones
    Scan {
        /// Inbox directory (defaults to paths.inbox)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Watch the inbox for new PDFs (continuous mode)
    Watch {
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Show inbox queue status
    Status {
        /// Number of recent items to list
        #[arg(short, long, default_value = "5")]
        recent: usize,
    },
}

pub async fn execute(command: InboxCommands) -> Result<()> {
    let cfg = config::config()?;
    let queue = InboxQueue::open(cfg.inbox_queue_path())
        .await
        .context("Failed to open inbox queue")?;

    match command {
        InboxCommands::Status { recent } => show_status(&queue, recent).await,
        InboxCommands::Scan { path } => {
            let dir = path.unwrap_or_else(|| cfg.inbox_dir.clone());
            let watcher = InboxWatcher::new(&dir, cfg.inbox.clone(), queue, open_ingestor()?);

            println!("📂 Scanning {}", dir.display());
            let report = watcher.scan_once().await?;
            println!("   New files:        {}", report.new_files);
            println!("   Already ingested: {}", report.already_ingested);
            println!("   Retried:          {}", report.reset_for_retry);
            println!("   Ingested:         {}", report.ingested);
            println!("   Failed:           {}", report.failed);
            if report.errors > 0 {
                println!("   Errors:           {}", report.errors);
            }
            Ok(())
        }
        InboxCommands::Watch { path } => {
            let dir = path.unwrap_or_else(|| cfg.inbox_dir.clone());
            let watcher = Arc::new(InboxWatcher::new(
                &dir,
                cfg.inbox.clone(),
                queue,
                open_ingestor()?,
            ));

            println!("👀 Watching {} (Ctrl+C to stop)", dir.display());
            let handle = watcher.watch().await?;
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl+C")?;
            handle.stop().await
        }
    }
}

async fn show_status(queue: &InboxQueue, recent: usize) -> Result<()> {
    let summary = queue.summary().await?;

    println!("Inbox queue: {}", queue.path().display());
    println!("  Pending:  {}", summary.pending);
    println!("  Ingested: {}", summary.ingested);
    println!("  Failed:   {}", summary.failed);
    println!("  Total:    {}", summary.total());

    let items = queue.recent(recent).await?;
    if !items.is_empty() {
        println!();
        println!("Recent:");
    }
    for item in items {
        let detail = match item.status {
            InboxStatus::Ingested => format!(
                "document {} via {}",
                item.document_id.unwrap_or_default(),
                item.parsed_by.as_deref().unwrap_or("?")
            ),
            InboxStatus::Failed => item.error.unwrap_or_default(),
            InboxStatus::Pending => "pending".to_string(),
        };
        println!("  {}  {:<30} {}", item.id, item.file.file_name, detail);
    }

    Ok(())
}
