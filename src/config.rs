//! Configuration for ingestor.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (INGESTOR_HOME, INGESTOR_DATABASE, OPENAI_API_KEY, ...)
//! 2. Config file (.ingestor/config.yaml)
//! 3. Defaults (~/.ingestor)
//!
//! Config file discovery:
//! - Searches current directory and parents for .ingestor/config.yaml
//! - Paths in config file are relative to the .ingestor/ directory

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::limits::InputLimits;
use crate::core::orchestrator::TimeoutPolicy;
use crate::domain::TaskType;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub backends: BackendSettings,
    #[serde(default)]
    pub voice: VoiceSettings,
    #[serde(default)]
    pub limits: InputLimits,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub inbox: InboxSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .ingestor/)
    pub home: Option<String>,
    /// SQLite database file (relative to .ingestor/)
    pub database: Option<String>,
    /// Directory scanned for incoming PDFs (relative to .ingestor/)
    pub inbox: Option<String>,
}

/// Ingestion pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Stored document content is cut at this many characters
    #[serde(default = "default_content_cap")]
    pub content_cap_chars: usize,

    /// Learned pattern keys are cut at this many characters
    #[serde(default = "default_pattern_key_chars")]
    pub pattern_key_chars: usize,

    /// Queue every ingested document for embedding
    #[serde(default = "default_true")]
    pub queue_document_embeddings: bool,

    /// Results below this cosine similarity are dropped from search
    #[serde(default = "default_min_similarity")]
    pub search_min_similarity: f32,

    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

fn default_content_cap() -> usize {
    50_000
}
fn default_pattern_key_chars() -> usize {
    100
}
fn default_true() -> bool {
    true
}
fn default_min_similarity() -> f32 {
    0.5
}
fn default_search_limit() -> usize {
    10
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            content_cap_chars: default_content_cap(),
            pattern_key_chars: default_pattern_key_chars(),
            queue_document_embeddings: true,
            search_min_similarity: default_min_similarity(),
            search_limit: default_search_limit(),
        }
    }
}

/// Embedding backends and vector shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// Vector dimension (384 for MiniLM-style encoders, 1536 for ada-style)
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Text sent to embedding backends is cut at this many characters
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    /// Register the deterministic pseudo embedder as the last resort
    #[serde(default = "default_true")]
    pub allow_pseudo: bool,

    #[serde(default, skip_serializing)]
    pub openai_api_key: Option<String>,

    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    #[serde(default)]
    pub ollama_url: Option<String>,

    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,
}

fn default_dimension() -> usize {
    384
}
fn default_max_input_chars() -> usize {
    8000
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_openai_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_ollama_model() -> String {
    "all-minilm".to_string()
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            max_input_chars: default_max_input_chars(),
            allow_pseudo: true,
            openai_api_key: None,
            openai_base_url: default_openai_base_url(),
            openai_model: default_openai_model(),
            ollama_url: None,
            ollama_model: default_ollama_model(),
        }
    }
}

/// Backend selection, ordering and timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Per-attempt timeout in seconds (default: 300)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Per-backend timeout overrides, keyed by backend name
    #[serde(default)]
    pub timeouts: HashMap<String, u64>,

    /// Backend names that are never registered
    #[serde(default)]
    pub disabled: Vec<String>,

    /// Try order per task; unnamed backends keep their default order after these
    #[serde(default)]
    pub order: HashMap<TaskType, Vec<String>>,

    #[serde(default)]
    pub tools: ToolSettings,
}

fn default_timeout_seconds() -> u64 {
    300
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            timeouts: HashMap::new(),
            disabled: Vec::new(),
            order: HashMap::new(),
            tools: ToolSettings::default(),
        }
    }
}

impl BackendSettings {
    pub fn timeout_policy(&self) -> TimeoutPolicy {
        let seconds = if self.timeout_seconds == 0 {
            default_timeout_seconds()
        } else {
            self.timeout_seconds
        };
        self.timeouts.iter().fold(
            TimeoutPolicy::new(Duration::from_secs(seconds)),
            |policy, (name, secs)| policy.with_override(name.clone(), Duration::from_secs(*secs)),
        )
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.iter().any(|d| d == name)
    }
}

/// External tool locations and service endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    #[serde(default = "default_pdftotext")]
    pub pdftotext: String,
    #[serde(default = "default_pdftoppm")]
    pub pdftoppm: String,
    #[serde(default = "default_tesseract")]
    pub tesseract: String,
    #[serde(default = "default_ocr_dpi")]
    pub ocr_dpi: u32,
    #[serde(default)]
    pub tika_url: Option<String>,
    #[serde(default = "default_whisper")]
    pub whisper: String,
    #[serde(default = "default_whisper_model")]
    pub whisper_model: String,
    #[serde(default)]
    pub whisper_url: Option<String>,
    #[serde(default = "default_say")]
    pub say: String,
    #[serde(default = "default_piper")]
    pub piper: String,
    #[serde(default)]
    pub piper_model: Option<String>,
    #[serde(default = "default_espeak")]
    pub espeak: String,
}

fn default_pdftotext() -> String {
    "pdftotext".to_string()
}
fn default_pdftoppm() -> String {
    "pdftoppm".to_string()
}
fn default_tesseract() -> String {
    "tesseract".to_string()
}
fn default_ocr_dpi() -> u32 {
    300
}
fn default_whisper() -> String {
    "whisper".to_string()
}
fn default_whisper_model() -> String {
    "base".to_string()
}
fn default_say() -> String {
    "say".to_string()
}
fn default_piper() -> String {
    "piper".to_string()
}
fn default_espeak() -> String {
    "espeak-ng".to_string()
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            pdftotext: default_pdftotext(),
            pdftoppm: default_pdftoppm(),
            tesseract: default_tesseract(),
            ocr_dpi: default_ocr_dpi(),
            tika_url: None,
            whisper: default_whisper(),
            whisper_model: default_whisper_model(),
            whisper_url: None,
            say: default_say(),
            piper: default_piper(),
            piper_model: None,
            espeak: default_espeak(),
        }
    }
}

/// Voice command processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSettings {
    /// Try to embed every command (best effort)
    #[serde(default = "default_true")]
    pub embed_commands: bool,

    #[serde(default = "default_user_type")]
    pub default_user_type: String,

    #[serde(default = "default_page_route")]
    pub default_page_route: String,

    /// Canned response per intent name
    #[serde(default = "default_responses")]
    pub responses: HashMap<String, String>,

    /// Response for intents missing from `responses`
    #[serde(default = "default_response")]
    pub default_response: String,

    #[serde(default = "default_tone")]
    pub tone: String,
}

fn default_user_type() -> String {
    "boss".to_string()
}
fn default_page_route() -> String {
    "/".to_string()
}
fn default_responses() -> HashMap<String, String> {
    [
        ("navigation", "Navigating you there right now, boss!"),
        ("query", "Let me search for that information."),
        ("control", "Done! Action completed."),
        ("general", "Got it! I'm processing your request."),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
fn default_response() -> String {
    "I hear you, boss!".to_string()
}
fn default_tone() -> String {
    "friendly".to_string()
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            embed_commands: true,
            default_user_type: default_user_type(),
            default_page_route: default_page_route(),
            responses: default_responses(),
            default_response: default_response(),
            tone: default_tone(),
        }
    }
}

impl VoiceSettings {
    /// Canned response for an intent name
    pub fn response_for(&self, intent: &str) -> &str {
        self.responses
            .get(intent)
            .map(String::as_str)
            .unwrap_or(&self.default_response)
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Allowed CORS origins (empty allows any origin)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: Vec::new(),
        }
    }
}

/// PDF inbox watching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxSettings {
    /// How long a file must be stable before it is ingested (seconds)
    #[serde(default = "default_stability_delay")]
    pub stability_delay_secs: u64,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_stability_delay() -> u64 {
    5
}
fn default_extensions() -> Vec<String> {
    vec!["pdf".to_string()]
}

impl Default for InboxSettings {
    fn default() -> Self {
        Self {
            stability_delay_secs: default_stability_delay(),
            extensions: default_extensions(),
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory
    pub home: PathBuf,
    /// SQLite database file
    pub database: PathBuf,
    /// PDF inbox directory
    pub inbox_dir: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub pipeline: PipelineSettings,
    pub embedding: EmbeddingSettings,
    pub backends: BackendSettings,
    pub voice: VoiceSettings,
    pub limits: InputLimits,
    pub server: ServerSettings,
    pub inbox: InboxSettings,
}

impl ResolvedConfig {
    /// Defaults rooted at `home`, ignoring config files and environment
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            database: home.join("ingestor.db"),
            inbox_dir: home.join("inbox"),
            home,
            config_file: None,
            pipeline: PipelineSettings::default(),
            embedding: EmbeddingSettings::default(),
            backends: BackendSettings::default(),
            voice: VoiceSettings::default(),
            limits: InputLimits::default(),
            server: ServerSettings::default(),
            inbox: InboxSettings::default(),
        }
    }

    /// Path of the inbox queue log
    pub fn inbox_queue_path(&self) -> PathBuf {
        self.home.join("inbox_queue.jsonl")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".ingestor").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse config YAML content
pub fn parse_config(content: &str) -> Result<ConfigFile> {
    serde_yaml::from_str(content).context("Invalid config YAML")
}

/// Resolve a path that may be relative to the config file's directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Combine defaults, an optional config file and environment lookups
pub fn resolve(
    default_home: PathBuf,
    file: Option<(PathBuf, ConfigFile)>,
    env: impl Fn(&str) -> Option<String>,
) -> ResolvedConfig {
    let (config_file, config) = match file {
        Some((path, config)) => (Some(path), config),
        None => (None, ConfigFile::default()),
    };

    let config_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf);
    let from_file = |value: &Option<String>| -> Option<PathBuf> {
        match (value, &config_dir) {
            (Some(v), Some(dir)) => Some(resolve_path(dir, v)),
            (Some(v), None) => Some(PathBuf::from(v)),
            _ => None,
        }
    };

    let home = env("INGESTOR_HOME")
        .map(PathBuf::from)
        .or_else(|| from_file(&config.paths.home))
        .unwrap_or(default_home);

    let mut resolved = ResolvedConfig::with_home(home);
    resolved.config_file = config_file;

    if let Some(database) = env("INGESTOR_DATABASE")
        .map(PathBuf::from)
        .or_else(|| from_file(&config.paths.database))
    {
        resolved.database = database;
    }
    if let Some(inbox) = env("INGESTOR_INBOX")
        .map(PathBuf::from)
        .or_else(|| from_file(&config.paths.inbox))
    {
        resolved.inbox_dir = inbox;
    }

    resolved.pipeline = config.pipeline;
    resolved.embedding = config.embedding;
    resolved.backends = config.backends;
    resolved.voice = config.voice;
    resolved.limits = config.limits;
    resolved.server = config.server;
    resolved.inbox = config.inbox;

    if let Some(bind) = env("INGESTOR_BIND") {
        resolved.server.bind = bind;
    }
    if let Some(key) = env("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
        resolved.embedding.openai_api_key = Some(key);
    }
    if let Some(url) = env("OLLAMA_URL").filter(|u| !u.is_empty()) {
        resolved.embedding.ollama_url = Some(url);
    }
    let tools = &mut resolved.backends.tools;
    if let Some(url) = env("TIKA_URL").filter(|u| !u.is_empty()) {
        tools.tika_url = Some(url);
    }
    if let Some(path) = env("WHISPER_PATH").filter(|p| !p.is_empty()) {
        tools.whisper = path;
    }
    if let Some(url) = env("WHISPER_BASE_URL").filter(|u| !u.is_empty()) {
        tools.whisper_url = Some(url);
    }

    resolved
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".ingestor");

    let file = match find_config_file() {
        Some(path) => {
            let config = load_config_file(&path)?;
            Some((path, config))
        }
        None => None,
    };

    Ok(resolve(default_home, file, |key| std::env::var(key).ok()))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (bypasses the cache)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}
