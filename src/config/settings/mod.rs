
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::chunker::ChunkLimits;

pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedder: EmbedderConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub chunking: ChunkLimits,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbedderConfig {
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "all-minilm:latest".to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            batch_size: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub timeout_seconds: u64,
    /// Records per upsert round trip.
    pub upload_batch_size: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:6333".to_string(),
            api_key: None,
            collection: "textbook_chunks_v1".to_string(),
            timeout_seconds: 30,
            upload_batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_prompt: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            api_key: None,
            model: "gemini-2.0-flash".to_string(),
            max_tokens: 2048,
            temperature: 0.3,
            system_prompt: "You are a helpful AI assistant for a robotics textbook. \
                Answer questions based ONLY on the provided context from the textbook. \
                If the information is not in the context, say 'Information not found in the book.' \
                Always cite sources using [Chapter X, Section Y.Z] format."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub score_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            score_threshold: 0.3,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(usize),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(usize),
    #[error("Invalid collection name: {0} (cannot be empty)")]
    InvalidCollection(String),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid score threshold: {0} (must be between 0.0 and 1.0)")]
    InvalidScoreThreshold(f32),
    #[error("Invalid top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid max chunk tokens: {0} (must be between 64 and 4096)")]
    InvalidMaxTokens(usize),
    #[error("Min chunk tokens ({0}) must be less than max chunk tokens ({1})")]
    MinTokensTooLarge(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                embedder: EmbedderConfig::default(),
                vector_store: VectorStoreConfig::default(),
                generation: GenerationConfig::default(),
                chunking: ChunkLimits::default(),
                retrieval: RetrievalConfig::default(),
                base_dir: config_dir.as_ref().to_path_buf(),
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Load from the platform config directory (`~/.config/textbook-rag`).
    #[inline]
    pub fn load_default() -> Result<Self> {
        let base = dirs::config_dir()
            .context("Could not determine user config directory")?
            .join("textbook-rag");
        Self::load(base)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.base_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedder.validate()?;
        self.vector_store.validate()?;
        self.generation.validate()?;

        if !(64..=4096).contains(&self.chunking.max_tokens) {
            return Err(ConfigError::InvalidMaxTokens(self.chunking.max_tokens));
        }
        if self.chunking.min_tokens >= self.chunking.max_tokens {
            return Err(ConfigError::MinTokensTooLarge(
                self.chunking.min_tokens,
                self.chunking.max_tokens,
            ));
        }

        if !(1..=100).contains(&self.retrieval.top_k) {
            return Err(ConfigError::InvalidTopK(self.retrieval.top_k));
        }
        if !(0.0..=1.0).contains(&self.retrieval.score_threshold) {
            return Err(ConfigError::InvalidScoreThreshold(
                self.retrieval.score_threshold,
            ));
        }

        Ok(())
    }

    /// Path of the SQLite query log database.
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.base_dir.join("queries.db")
    }
}

impl EmbedderConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_url(&self.base_url)?;
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }
        if !(64..=4096).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }
        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }
        Ok(())
    }

    #[inline]
    pub fn url(&self) -> Result<Url, ConfigError> {
        parse_url(&self.base_url)
    }
}

impl VectorStoreConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_url(&self.base_url)?;
        if self.collection.trim().is_empty() {
            return Err(ConfigError::InvalidCollection(self.collection.clone()));
        }
        if self.upload_batch_size == 0 || self.upload_batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.upload_batch_size));
        }
        Ok(())
    }

    #[inline]
    pub fn url(&self) -> Result<Url, ConfigError> {
        parse_url(&self.base_url)
    }
}

impl GenerationConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_url(&self.base_url)?;
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }
        Ok(())
    }

    #[inline]
    pub fn url(&self) -> Result<Url, ConfigError> {
        parse_url(&self.base_url)
    }
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))
}

impl From<ConfigError> for crate::RagError {
    fn from(error: ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}

/// Print the active configuration with secrets masked.
#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load_default()?;

    println!("Embedder:");
    println!("  URL:        {}", config.embedder.base_url);
    println!("  Model:      {}", config.embedder.model);
    println!("  Dimension:  {}", config.embedder.dimension);
    println!("Vector store:");
    println!("  URL:        {}", config.vector_store.base_url);
    println!("  Collection: {}", config.vector_store.collection);
    println!("  API key:    {}", mask(config.vector_store.api_key.as_deref()));
    println!("Generation:");
    println!("  URL:        {}", config.generation.base_url);
    println!("  Model:      {}", config.generation.model);
    println!("  API key:    {}", mask(config.generation.api_key.as_deref()));
    println!("Chunking:");
    println!("  Max tokens: {}", config.chunking.max_tokens);
    println!("  Min tokens: {}", config.chunking.min_tokens);
    println!("Retrieval:");
    println!("  Top-k:      {}", config.retrieval.top_k);
    println!("  Threshold:  {}", config.retrieval.score_threshold);

    Ok(())
}

fn mask(secret: Option<&str>) -> String {
    match secret {
        Some(value) if value.len() > 4 => {
            let tail: String = value.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
            format!("***{}", tail)
        }
        Some(_) => "***".to_string(),
        None => "(not set)".to_string(),
    }
}
