//! Configuration types shared across crates.

use crate::advertisement::DEFAULT_METADATA_PROTOCOL;
use crate::batch::DEFAULT_BATCH_SIZE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Control-plane server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum entries accepted in one chunk.
    #[serde(default = "default_max_chunk_entries")]
    pub max_chunk_entries: usize,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Seconds an unpublished handle stays valid.
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    /// Maximum handles open at once; `create` fails beyond this.
    #[serde(default = "default_max_open_sessions")]
    pub max_open_sessions: usize,
    /// Enable the /metrics endpoint for Prometheus scraping.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_max_chunk_entries() -> usize {
    1024
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_session_timeout_secs() -> u64 {
    3600
}

fn default_max_open_sessions() -> usize {
    1024
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_chunk_entries: default_max_chunk_entries(),
            max_body_bytes: default_max_body_bytes(),
            session_timeout_secs: default_session_timeout_secs(),
            max_open_sessions: default_max_open_sessions(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Get the session timeout as a Duration.
    pub fn session_timeout(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.session_timeout_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    /// Validate server configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_chunk_entries == 0 {
            return Err("server.max_chunk_entries must be at least 1".to_string());
        }
        if self.max_body_bytes == 0 {
            return Err("server.max_body_bytes must be at least 1".to_string());
        }
        if self.session_timeout_secs == 0 {
            return Err("server.session_timeout_secs must be at least 1".to_string());
        }
        if self.max_open_sessions == 0 {
            return Err("server.max_open_sessions must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Block store backend configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// In-process store; contents are lost on restart.
    #[default]
    Memory,
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StoreConfig::Memory => Ok(()),
            StoreConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err("store.path must not be empty".to_string())
            }
            StoreConfig::Filesystem { .. } => Ok(()),
        }
    }
}

/// Publisher (client) configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Base URL of the control-plane service.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Entries per chunk.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Provider peer id.
    #[serde(default)]
    pub provider: Option<String>,
    /// Retrieval addresses announced for the provider.
    #[serde(default)]
    pub addresses: Vec<String>,
    /// Metadata protocol id.
    #[serde(default = "default_metadata_protocol")]
    pub metadata_protocol: u64,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_metadata_protocol() -> u64 {
    DEFAULT_METADATA_PROTOCOL
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            batch_size: default_batch_size(),
            provider: None,
            addresses: Vec::new(),
            metadata_protocol: default_metadata_protocol(),
        }
    }
}

impl PublisherConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("publisher.batch_size must be at least 1".to_string());
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(format!(
                "publisher.endpoint {:?} must be an http(s) URL",
                self.endpoint
            ));
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
}

impl AppConfig {
    /// Validate every section, reporting the first failure.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.store.validate()?;
        self.publisher.validate()
    }
}
