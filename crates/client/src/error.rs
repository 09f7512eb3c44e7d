//! Publish error types.

use herald_archive::ArchiveError;
use std::fmt;
use thiserror::Error;

/// Why the service (or the transport in front of it) refused a call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    /// HTTP status, or `None` when no response was received.
    pub status: Option<u16>,
    pub message: String,
}

impl Rejection {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {status}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Errors that end a publish run.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("index unavailable: {0}")]
    IndexUnavailable(#[from] ArchiveError),

    #[error("create rejected: {0}")]
    CreateRejected(Rejection),

    #[error("append rejected: {0}")]
    AppendRejected(Rejection),

    #[error("publish rejected: {0}")]
    PublishRejected(Rejection),

    #[error("encoding error: {0}")]
    Encoding(#[from] herald_core::Error),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Result type alias for publish operations.
pub type Result<T> = std::result::Result<T, PublishError>;
