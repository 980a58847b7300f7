//! Command-line interface for ingestor.
//!
//! Provides commands for serving the HTTP API, running single extractions
//! from the terminal, inspecting learned patterns and managing the
//! embedding queue and the PDF inbox.

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{self, ResolvedConfig};
use crate::pipeline::{AppContext, Ingestor, VoiceInput};
use crate::server;

pub mod inbox;

/// ingestor - Resilient multi-backend ingestion pipeline
#[derive(Parser, Debug)]
#[command(name = "ingestor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP API
    Serve {
        /// Address to bind to (defaults to server.bind from config)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Extract and store a PDF
    Pdf {
        /// Path to the PDF
        path: PathBuf,
    },

    /// Process a voice command transcript
    Voice {
        /// Command text
        text: String,

        #[arg(long)]
        user_type: Option<String>,

        #[arg(long)]
        page_route: Option<String>,
    },

    /// Embed text (reads stdin if no text is given)
    Embed {
        text: Option<String>,

        /// Print the full vector
        #[arg(long)]
        full: bool,
    },

    /// Cosine similarity between two texts
    Similarity { text1: String, text2: String },

    /// Transcribe an audio file
    Stt {
        file: PathBuf,

        #[arg(short, long)]
        language: Option<String>,
    },

    /// Synthesize speech into a file
    Tts {
        text: String,

        /// Output audio file
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long)]
        voice: Option<String>,
    },

    /// Probe every backend
    Health,

    /// Show the most frequent learned patterns
    Patterns {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Semantic search over stored commands and documents
    Search {
        query: String,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Manage the document embedding queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },

    /// Manage the PDF inbox
    Inbox {
        #[command(subcommand)]
        command: inbox::InboxCommands,
    },

    /// Show resolved configuration (debug)
    Config,
}

#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// Embed pending documents
    Process {
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show queue counts
    Status,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Config => show_config(),
            Commands::Serve { bind } => {
                let config = config::config()?.clone();
                let bind = bind.unwrap_or_else(|| config.server.bind.clone());
                let ingestor = AppContext::initialize(config)?.ingestor();
                server::serve(ingestor, &bind).await
            }
            Commands::Inbox { command } => inbox::execute(command).await,
            command => {
                let ingestor = open_ingestor()?;
                run_command(&ingestor, command).await
            }
        }
    }
}

/// Build the pipeline from the global configuration
pub(crate) fn open_ingestor() -> Result<Ingestor> {
    let config: ResolvedConfig = config::config()?.clone();
    Ok(AppContext::initialize(config)?.ingestor())
}

async fn run_command(ingestor: &Ingestor, command: Commands) -> Result<()> {
    match command {
        Commands::Pdf { path } => {
            let ingestion = ingestor.ingest_pdf(&path).await?;
            let document = &ingestion.document;
            println!("✅ Stored document {}", document.id);
            println!("   Parsed by:  {}", document.parsed_by);
            println!("   Characters: {}", document.content.chars().count());
            if let Some(pages) = document.page_count {
                println!("   Pages:      {}", pages);
            }
            if document.truncated {
                println!("   (content truncated)");
            }
            for failure in &ingestion.failures {
                println!("   ⚠️  {} skipped: {}", failure.backend, failure.reason);
            }
        }
        Commands::Voice {
            text,
            user_type,
            page_route,
        } => {
            let outcome = ingestor
                .process_voice(VoiceInput {
                    text,
                    user_type,
                    page_route,
                })
                .await?;
            println!("Intent:    {}", outcome.intent);
            println!("Sentiment: {}", outcome.sentiment);
            println!("Embedded:  {}", outcome.has_embedding);
            println!("Ledger id: {}", outcome.ledger_id);
            println!("Seen:      {} time(s)", outcome.pattern.occurrence_count);
            println!();
            println!("{}", outcome.response_text);
        }
        Commands::Embed { text, full } => {
            let text = match text {
                Some(text) => text,
                None => read_stdin()?,
            };
            let outcome = ingestor.embed_text(&text).await?;
            println!("Backend:   {}", outcome.backend);
            println!("Dimension: {}", outcome.dimension);
            if full {
                println!("{}", serde_json::to_string(&outcome.embedding)?);
            } else {
                let head: Vec<String> = outcome
                    .embedding
                    .iter()
                    .take(8)
                    .map(|v| format!("{:.4}", v))
                    .collect();
                println!("Vector:    [{}, ...]", head.join(", "));
            }
        }
        Commands::Similarity { text1, text2 } => {
            let similarity = ingestor.similarity(&text1, &text2).await?;
            println!("{:.4}", similarity);
        }
        Commands::Stt { file, language } => {
            let audio = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let outcome = ingestor
                .transcribe(audio, mime_for(&file), language)
                .await?;
            println!("[{} / {}]", outcome.backend, outcome.transcript.language);
            println!("{}", outcome.transcript.text);
        }
        Commands::Tts {
            text,
            output,
            voice,
        } => {
            let outcome = ingestor.synthesize(&text, voice).await?;
            std::fs::write(&output, &outcome.audio.bytes)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!(
                "✅ Wrote {} bytes of {} to {} ({})",
                outcome.audio.bytes.len(),
                outcome.audio.mime_type,
                output.display(),
                outcome.backend
            );
        }
        Commands::Health => {
            let report = ingestor.health().await;
            println!("Status: {}", report.status);
            for (task, backends) in &report.backends {
                println!();
                println!("{}:", task);
                if backends.is_empty() {
                    println!("  (no backends registered)");
                }
                for (name, health) in backends {
                    let mark = if health.available { "✅" } else { "❌" };
                    match &health.reason {
                        Some(reason) => println!("  {} {:<14} {}", mark, name, reason),
                        None => println!("  {} {}", mark, name),
                    }
                }
            }
        }
        Commands::Patterns { limit } => {
            let patterns = ingestor.patterns(limit).await?;
            if patterns.is_empty() {
                println!("No patterns learned yet.");
            }
            for pattern in patterns {
                println!(
                    "{:>5}  {:<10}  {}",
                    pattern.occurrence_count, pattern.pattern_type, pattern.pattern_text
                );
            }
        }
        Commands::Search { query, limit } => {
            let hits = ingestor.search(&query, limit).await?;
            if hits.is_empty() {
                println!("No matches.");
            }
            for hit in hits {
                println!("{:.3}  {:<8} #{:<5} {}", hit.similarity, hit.kind, hit.id, hit.text);
            }
        }
        Commands::Queue { command } => match command {
            QueueCommands::Process { limit } => {
                let report = ingestor.process_embedding_queue(limit).await?;
                println!(
                    "Processed {} of {} ({} failed)",
                    report.processed, report.total, report.failed
                );
            }
            QueueCommands::Status => {
                let counts = ingestor.store().queue_counts()?;
                println!("Pending:   {}", counts.pending);
                println!("Completed: {}", counts.completed);
                println!("Failed:    {}", counts.failed);
            }
        },
        Commands::Serve { .. } | Commands::Inbox { .. } | Commands::Config => {
            anyhow::bail!("command is dispatched by Cli::execute")
        }
    }

    Ok(())
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read from stdin")?;
    Ok(buffer)
}

/// Audio MIME type from a file extension
fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        Some("webm") => "audio/webm",
        Some("flac") => "audio/flac",
        Some("aiff") | Some("aif") => "audio/aiff",
        _ => "audio/wav",
    }
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("Ingestor Configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Database: {}", cfg.database.display());
    println!("  Inbox:    {}", cfg.inbox_dir.display());
    println!();
    println!("Pipeline:");
    println!("  Content cap:      {} chars", cfg.pipeline.content_cap_chars);
    println!("  Pattern key:      {} chars", cfg.pipeline.pattern_key_chars);
    println!("  Embedding dim:    {}", cfg.embedding.dimension);
    println!("  Embedding input:  {} chars", cfg.embedding.max_input_chars);
    println!("  Pseudo fallback:  {}", cfg.embedding.allow_pseudo);
    println!(
        "  OpenAI key:       {}",
        if cfg.embedding.openai_api_key.is_some() { "set" } else { "not set" }
    );
    println!();
    println!("Backends:");
    println!("  Timeout:  {}s", cfg.backends.timeout_seconds);
    for (name, secs) in &cfg.backends.timeouts {
        println!("  Timeout ({}): {}s", name, secs);
    }
    if !cfg.backends.disabled.is_empty() {
        println!("  Disabled: {}", cfg.backends.disabled.join(", "));
    }
    println!();
    println!("Server:");
    println!("  Bind: {}", cfg.server.bind);

    Ok(())
}
