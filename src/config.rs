//! TOML configuration.
//!
//! Every section is optional; a file containing only `[retrieval]\ntop_k = 5`
//! is valid. See `config/docqa.example.toml` for every key.
//!
//! | Section | Purpose |
//! |---------|---------|
//! | `[chunking]` | Window size, overlap, and split strategy |
//! | `[retrieval]` | Top-k and similarity metric |
//! | `[embedding]` | Embedding provider and its connection settings |
//! | `[generation]` | Answer generator and its connection settings |
//! | `[index]` | Default index file location |
//! | `[server]` | HTTP bind address and idle session lifetime |
//!
//! Secrets are never read from the file. Remote providers take their API
//! key from the environment (`OPENAI_API_KEY`).

use anyhow::{bail, Context, Result};
use doc_qa_core::chunk::{ChunkerConfig, SplitStrategy, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use doc_qa_core::index::Metric;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Path used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/docqa.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default)]
    pub strategy: SplitStrategy,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            strategy: SplitStrategy::default(),
        }
    }
}

impl ChunkingConfig {
    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            strategy: self.strategy,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub metric: Metric,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            metric: Metric::default(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (Ollama, or an OpenAI-compatible endpoint).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: 0,
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn requires_model(&self) -> bool {
        matches!(self.provider.as_str(), "openai" | "ollama")
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            url: None,
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            max_retries: 0,
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_generation_provider() -> String {
    "extractive".to_string()
}
fn default_max_tokens() -> u32 {
    256
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("data/index.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Sessions unused for this long are dropped. 0 keeps them forever.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

impl ServerConfig {
    pub fn session_idle(&self) -> Option<Duration> {
        (self.session_idle_secs > 0).then(|| Duration::from_secs(self.session_idle_secs))
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}
fn default_session_idle_secs() -> u64 {
    3600
}

impl Config {
    /// Built-in defaults: offline hash embeddings and extractive answers.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Chunking
        self.chunking
            .chunker_config()
            .validate()
            .map_err(|e| anyhow::anyhow!("chunking: {}", e))?;

        // Retrieval
        if self.retrieval.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }

        // Embedding
        match self.embedding.provider.as_str() {
            "hash" | "openai" | "ollama" | "local" | "disabled" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be hash, openai, ollama, local, or disabled.",
                other
            ),
        }
        if self.embedding.requires_model() {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }
        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0");
        }
        if self.embedding.batch_size < 1 {
            bail!("embedding.batch_size must be >= 1");
        }
        if self.embedding.timeout_secs == 0 {
            bail!("embedding.timeout_secs must be > 0");
        }

        // Generation
        match self.generation.provider.as_str() {
            "extractive" => {}
            "openai" | "ollama" => {
                if self.generation.model.is_none() {
                    bail!(
                        "generation.model must be specified when provider is '{}'",
                        self.generation.provider
                    );
                }
            }
            other => bail!(
                "Unknown generation provider: '{}'. Must be extractive, openai, or ollama.",
                other
            ),
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            bail!("generation.temperature must be in [0.0, 2.0]");
        }
        if self.generation.max_tokens == 0 {
            bail!("generation.max_tokens must be > 0");
        }
        if self.generation.timeout_secs == 0 {
            bail!("generation.timeout_secs must be > 0");
        }

        Ok(())
    }
}

/// Load configuration from `path`.
///
/// A missing file at [`DEFAULT_CONFIG_PATH`] falls back to
/// [`Config::minimal`]; any other missing file is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG_PATH) {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::minimal());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    Config::from_toml(&content).with_context(|| format!("Invalid config: {}", path.display()))
}
