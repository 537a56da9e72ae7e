use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to load {resource} from {}: {reason}", path.display())]
    ResourceLoad { resource: &'static str, path: PathBuf, reason: String },

    #[error("Malformed data: {0}")]
    Malformed(String),

    #[error("Embedding dimension mismatch: corpus has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Corpus is inconsistent: {embeddings} embedding rows but {questions} questions")]
    LengthMismatch { embeddings: usize, questions: usize },

    #[error("Embedding failed: {0}")]
    Embedding(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn resource_load(resource: &'static str, path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ResourceLoad { resource, path: path.into(), reason: reason.to_string() }
    }
}
