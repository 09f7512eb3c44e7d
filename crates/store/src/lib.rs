//! Block storage for Herald.
//!
//! This crate provides:
//! - Content-addressed block storage with verified reads
//! - The provider's chain head record
//! - Readers for the entries list and the advertisement chain
//! - Backends: in-memory and local filesystem

pub mod backends;
pub mod chain;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, memory::MemoryBackend};
pub use error::{StoreError, StoreResult};
pub use traits::BlockStore;

use herald_core::config::StoreConfig;
use std::sync::Arc;

/// Create a block store from configuration.
pub async fn from_config(config: &StoreConfig) -> StoreResult<Arc<dyn BlockStore>> {
    config.validate().map_err(StoreError::Config)?;

    match config {
        StoreConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
        StoreConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}
