//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid content id: {0}")]
    InvalidContentId(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("invalid batch size: {0} (must be at least 1)")]
    InvalidBatchSize(usize),

    #[error("invalid entry chunk: {0}")]
    InvalidChunk(String),

    #[error("invalid advertisement: {0}")]
    InvalidAdvertisement(String),

    #[error("invalid advertisement handle: {0}")]
    InvalidHandle(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
