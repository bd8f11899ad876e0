//! Error types for boc-core.

use thiserror::Error;

/// Top-level error type for indexing and concept ranking.
#[derive(Debug, Error)]
pub enum Error {
    /// Term lookup on a strict index found nothing.
    #[error("term does not exist: {0}")]
    TermNotFound(String),

    /// Document lookup on a strict index found nothing.
    #[error("document does not exist: {0}")]
    DocumentNotFound(String),

    /// Caller supplied something the operation cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The concept store returned data that breaks its own contract.
    #[error("concept store error: {0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
}

/// Result type for boc-core operations.
pub type Result<T> = std::result::Result<T, Error>;
