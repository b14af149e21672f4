use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Index not found at {}; run the indexer first", .0.display())]
    IndexNotFound(PathBuf),

    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    #[error("Index was built with embedder '{indexed}' but '{configured}' is configured")]
    EmbedderMismatch { indexed: String, configured: String },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Operation failed: {0}")]
    Operation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
