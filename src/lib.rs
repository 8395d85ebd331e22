use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Document parse error: {0}")]
    Parse(String),

    #[error("Embedding service error: {0}")]
    Embedding(String),

    #[error("Vector index error: {0}")]
    Index(String),

    #[error("Generation service error: {0}")]
    Generation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Whether the caller may retry the failed operation.
    ///
    /// Embedding, index, and generation failures come from remote
    /// services and are transient; everything else is permanent.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Embedding(_) | Self::Index(_) | Self::Generation(_)
        )
    }
}

pub mod chunker;
pub mod citations;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod generation;
pub mod index;
pub mod orchestrator;
pub mod parser;
pub mod tokenizer;
