use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub kbase: KbaseConfig,
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Core paths and logging
#[derive(Debug, Clone, Deserialize)]
pub struct KbaseConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Embedding backend configuration (Ollama-compatible HTTP API)
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    pub api_url: String,
    pub model: String,
    pub dimensions: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Optional env var holding a bearer token for hosted backends
    #[serde(default)]
    pub api_key_env: Option<String>,
}

/// Ingestion pipeline tuning
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    /// Target chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// How many PENDING files a processor tick fetches
    #[serde(default = "default_fetch_batch_size")]
    pub fetch_batch_size: usize,
    /// How many files are processed in flight at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Background processor tick interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Pick per-format chunk profiles instead of the default one
    #[serde(default = "default_true")]
    pub use_file_type_optimization: bool,
}

/// Scanner and watcher tuning
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Files above this size are skipped when a root sets ignore_large
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    /// Watcher event debounce window in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            fetch_batch_size: default_fetch_batch_size(),
            max_concurrent: default_max_concurrent(),
            interval_ms: default_interval_ms(),
            use_file_type_optimization: true,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_fetch_batch_size() -> usize {
    10
}

fn default_max_concurrent() -> usize {
    3
}

fn default_interval_ms() -> u64 {
    5000
}

fn default_max_file_size() -> u64 {
    50 * 1024 * 1024
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in KBASE_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional; ignore errors
        let _ = dotenv::dotenv();

        let config_path = std::env::var("KBASE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .context("Failed to parse config.toml")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.embeddings.dimensions == 0 {
            anyhow::bail!("embeddings.dimensions must be greater than 0");
        }

        if self.processing.chunk_size == 0 {
            anyhow::bail!("processing.chunk_size must be greater than 0");
        }

        if self.processing.chunk_overlap >= self.processing.chunk_size {
            anyhow::bail!("processing.chunk_overlap must be less than chunk_size");
        }

        if self.processing.max_concurrent == 0 {
            anyhow::bail!("processing.max_concurrent must be greater than 0");
        }

        if self.processing.fetch_batch_size == 0 {
            anyhow::bail!("processing.fetch_batch_size must be greater than 0");
        }

        // A bearer token env var, when configured, must resolve
        if let Some(key_env) = &self.embeddings.api_key_env {
            std::env::var(key_env).with_context(|| {
                format!(
                    "Environment variable {} not set. Set it in your .env file or as an environment variable.",
                    key_env
                )
            })?;
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.kbase.db_path
    }
}
