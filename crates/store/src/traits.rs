//! Storage trait definitions.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use herald_core::{ContentId, EncodedBlock};

/// Content-addressed block storage plus the provider's chain head.
///
/// Blocks are immutable: writing an identifier that is already present is a
/// no-op. Reads verify that the returned bytes hash to the requested id.
#[async_trait]
pub trait BlockStore: Send + Sync + 'static {
    /// Store a block. Returns `false` when it was already present.
    async fn put(&self, block: &EncodedBlock) -> StoreResult<bool>;

    /// Fetch a block's bytes.
    async fn get(&self, id: &ContentId) -> StoreResult<Bytes>;

    /// Check whether a block exists.
    async fn contains(&self, id: &ContentId) -> StoreResult<bool>;

    /// The most recently published advertisement, if any.
    async fn head(&self) -> StoreResult<Option<ContentId>>;

    /// Record a new chain head.
    async fn set_head(&self, id: &ContentId) -> StoreResult<()>;

    /// Get the name of this storage backend.
    ///
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify the backend is usable. Called once at startup.
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Reject blocks whose bytes do not hash to their identifier.
pub(crate) fn verify_block(id: &ContentId, data: &[u8]) -> StoreResult<()> {
    let actual = ContentId::of(data);
    if &actual != id {
        return Err(StoreError::HashMismatch {
            expected: id.to_hex(),
            actual: actual.to_hex(),
        });
    }
    Ok(())
}
