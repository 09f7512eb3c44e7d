//! Local filesystem block store.
//!
//! Blocks live under `blocks/` fanned out by identifier prefix; the chain head
//! is a single `HEAD` file holding the head identifier in hex.

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlockStore, verify_block};
use async_trait::async_trait;
use bytes::Bytes;
use herald_core::{ContentId, EncodedBlock};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use uuid::Uuid;

const HEAD_FILE: &str = "HEAD";

/// Local filesystem block store.
#[derive(Debug)]
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend rooted at `root`.
    pub async fn new(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn block_path(&self, id: &ContentId) -> PathBuf {
        self.root.join(id.to_object_key())
    }

    /// Write to a uniquely named temp file, fsync, then rename into place.
    async fn write_atomic(&self, path: &Path, data: &[u8]) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        let temp_path = path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        );
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
        }
        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl BlockStore for FilesystemBackend {
    #[instrument(skip(self, block), fields(backend = "filesystem", id = %block.id, size = block.data.len()))]
    async fn put(&self, block: &EncodedBlock) -> StoreResult<bool> {
        verify_block(&block.id, &block.data)?;
        let path = self.block_path(&block.id);

        // Concurrent writers of one id write identical bytes.
        if fs::try_exists(&path).await? {
            return Ok(false);
        }
        self.write_atomic(&path, &block.data).await?;
        debug!("stored block");
        Ok(true)
    }

    #[instrument(skip(self), fields(backend = "filesystem", id = %id))]
    async fn get(&self, id: &ContentId) -> StoreResult<Bytes> {
        let data = fs::read(self.block_path(id)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(id.to_hex())
            } else {
                StoreError::Io(e)
            }
        })?;
        verify_block(id, &data)?;
        Ok(Bytes::from(data))
    }

    async fn contains(&self, id: &ContentId) -> StoreResult<bool> {
        fs::try_exists(self.block_path(id))
            .await
            .map_err(StoreError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self) -> StoreResult<Option<ContentId>> {
        let raw = match fs::read_to_string(self.root.join(HEAD_FILE)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        ContentId::parse(&raw)
            .map(Some)
            .map_err(|e| StoreError::InvalidHead(e.to_string()))
    }

    #[instrument(skip(self), fields(backend = "filesystem", id = %id))]
    async fn set_head(&self, id: &ContentId) -> StoreResult<()> {
        let line = format!("{}\n", id.to_hex());
        self.write_atomic(&self.root.join(HEAD_FILE), line.as_bytes())
            .await
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StoreResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StoreError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }
        Ok(())
    }
}
