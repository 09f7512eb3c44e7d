//! In-memory block store.

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlockStore, verify_block};
use async_trait::async_trait;
use bytes::Bytes;
use herald_core::{ContentId, EncodedBlock};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Block store backed by a `RwLock<HashMap>`.
///
/// Useful for tests and for services that do not need to survive a restart.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    blocks: RwLock<HashMap<ContentId, Bytes>>,
    head: RwLock<Option<ContentId>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks held.
    pub async fn len(&self) -> usize {
        self.blocks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blocks.read().await.is_empty()
    }
}

#[async_trait]
impl BlockStore for MemoryBackend {
    #[instrument(skip(self, block), fields(backend = "memory", id = %block.id, size = block.data.len()))]
    async fn put(&self, block: &EncodedBlock) -> StoreResult<bool> {
        verify_block(&block.id, &block.data)?;
        let mut blocks = self.blocks.write().await;
        if blocks.contains_key(&block.id) {
            return Ok(false);
        }
        blocks.insert(block.id.clone(), block.data.clone());
        debug!("stored block in memory");
        Ok(true)
    }

    async fn get(&self, id: &ContentId) -> StoreResult<Bytes> {
        self.blocks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_hex()))
    }

    async fn contains(&self, id: &ContentId) -> StoreResult<bool> {
        Ok(self.blocks.read().await.contains_key(id))
    }

    async fn head(&self) -> StoreResult<Option<ContentId>> {
        Ok(self.head.read().await.clone())
    }

    async fn set_head(&self, id: &ContentId) -> StoreResult<()> {
        *self.head.write().await = Some(id.clone());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
