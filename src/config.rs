use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::chunk::ChunkingStrategy;
use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("lexrag.db")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Strategies the sync engine maintains. Each gets its own chunk set,
    /// chunking state and sparse index.
    #[serde(default = "default_strategies")]
    pub strategies: Vec<ChunkingStrategy>,
    /// Raw-text prefixes/literals that mark an upstream collection failure.
    /// A document whose text starts with (or equals) one of these is recorded
    /// as COLLECTION_ERROR and never chunked.
    #[serde(default = "default_failure_markers")]
    pub failure_markers: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            failure_markers: default_failure_markers(),
        }
    }
}

fn default_strategies() -> Vec<ChunkingStrategy> {
    ChunkingStrategy::all().to_vec()
}

fn default_failure_markers() -> Vec<String> {
    vec!["ERRO_".to_string(), "Conteúdo não encontrado".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// OpenAI-compatible embeddings endpoint. Tests inject a scripted
    /// provider instead.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Inputs longer than this are truncated before the provider call.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            dims: default_dims(),
            endpoint: default_endpoint(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            timeout_secs: default_timeout_secs(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_endpoint() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_input_chars() -> usize {
    20_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Embedding updates buffered before a bulk write.
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
    /// Attempts for one bulk write before the batch is dropped and counted.
    #[serde(default = "default_storage_retries")]
    pub storage_retries: u32,
    /// Upper bound on embedding passes in one sync run.
    #[serde(default = "default_max_passes")]
    pub max_passes: u32,
    /// Consecutive no-progress passes (with failures) before aborting.
    #[serde(default = "default_stagnation_threshold")]
    pub stagnation_threshold: u32,
    /// Pause between embedding passes. Tests set this to 0.
    #[serde(default = "default_pass_delay_ms")]
    pub pass_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            flush_every: default_flush_every(),
            storage_retries: default_storage_retries(),
            max_passes: default_max_passes(),
            stagnation_threshold: default_stagnation_threshold(),
            pass_delay_ms: default_pass_delay_ms(),
        }
    }
}

fn default_flush_every() -> usize {
    100
}
fn default_storage_retries() -> u32 {
    3
}
fn default_max_passes() -> u32 {
    10
}
fn default_stagnation_threshold() -> u32 {
    3
}
fn default_pass_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Turns kept per session; the oldest is evicted beyond this.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

fn default_max_turns() -> usize {
    3
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Validation(format!("failed to read config file {}: {e}", path.display()))
    })?;

    let config: Config =
        toml::from_str(&content).map_err(|e| Error::Validation(format!("invalid config: {e}")))?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.strategies.is_empty() {
        return Err(Error::Validation(
            "chunking.strategies must not be empty".into(),
        ));
    }
    if config.embedding.model.is_empty() {
        return Err(Error::Validation("embedding.model must not be empty".into()));
    }
    if config.embedding.dims == 0 {
        return Err(Error::Validation("embedding.dims must be > 0".into()));
    }
    if config.sync.flush_every == 0 {
        return Err(Error::Validation("sync.flush_every must be > 0".into()));
    }
    if config.sync.max_passes == 0 {
        return Err(Error::Validation("sync.max_passes must be > 0".into()));
    }
    if config.sync.stagnation_threshold == 0 {
        return Err(Error::Validation(
            "sync.stagnation_threshold must be > 0".into(),
        ));
    }
    if config.session.max_turns == 0 {
        return Err(Error::Validation("session.max_turns must be > 0".into()));
    }
    Ok(())
}
