//! Archive error types.

use thiserror::Error;

/// Errors raised while reading or writing archives and their indexes.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid archive header: {0}")]
    InvalidHeader(String),

    #[error("invalid section at payload offset {offset}: {reason}")]
    InvalidSection { offset: u64, reason: String },

    #[error("invalid varint: {0}")]
    InvalidVarint(String),

    #[error("invalid cid: {0}")]
    InvalidCid(String),

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error(transparent)]
    Core(#[from] herald_core::Error),
}

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;
