//! The publish pipeline: index entries in, one advertisement out.

use crate::api_client::PublishApi;
use crate::error::{PublishError, Result};
use herald_archive::{ArchiveError, IndexEntry, IndexSource};
use herald_core::{
    AdvertisementDraft, ChunkAccumulator, ContentHash, ContentId, EntryChunk, EphemeralHandle,
};
use std::path::Path;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument};

/// Outcome of a successful run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishReport {
    /// Permanent identifier of the advertisement.
    pub id: ContentId,
    /// Handle the advertisement was built under.
    pub handle: EphemeralHandle,
    pub chunks: usize,
    pub entries: usize,
}

/// Drives create, append and publish against a [`PublishApi`].
///
/// Strictly sequential: each batch is sent, and acknowledged, before the next
/// one is accumulated. The first failure ends the run.
#[derive(Debug)]
pub struct Publisher<A> {
    api: A,
    batch_size: usize,
}

impl<A: PublishApi> Publisher<A> {
    pub fn new(api: A, batch_size: usize) -> Result<Self> {
        // Reject a zero batch size up front rather than after `create`.
        ChunkAccumulator::<ContentHash>::new(batch_size)?;
        Ok(Self { api, batch_size })
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Publish one advertisement carrying every entry of `entries`, in order.
    ///
    /// `entries` is read on the calling task; pass an in-memory source here
    /// and use [`Publisher::publish_archive`] for files.
    #[instrument(skip_all, fields(provider = %draft.provider, batch_size = self.batch_size))]
    pub async fn publish_entries<I>(
        &self,
        draft: &AdvertisementDraft,
        entries: I,
    ) -> Result<PublishReport>
    where
        I: IntoIterator<Item = std::result::Result<IndexEntry, ArchiveError>>,
    {
        let mut batches = self.open(draft).await?;
        for entry in entries {
            batches.push(entry?).await?;
        }
        batches.finish().await
    }

    /// Publish the contents of a CAR archive.
    ///
    /// The archive's index is opened (or regenerated) before anything is sent,
    /// so an unreadable archive never allocates a handle. Index reads run on
    /// the blocking pool and reach this task through a bounded channel.
    #[instrument(skip_all, fields(provider = %draft.provider, batch_size = self.batch_size))]
    pub async fn publish_archive(
        &self,
        draft: &AdvertisementDraft,
        path: impl AsRef<Path>,
    ) -> Result<PublishReport> {
        let path = path.as_ref().to_path_buf();
        let (opened_tx, opened_rx) = oneshot::channel();
        let (entries_tx, mut entries_rx) = mpsc::channel(self.batch_size.max(1) * 2);

        let reader = tokio::task::spawn_blocking(move || {
            let source = match IndexSource::open(path) {
                Ok(source) => source,
                Err(e) => {
                    let _ = opened_tx.send(Err(e));
                    return;
                }
            };
            let _ = opened_tx.send(Ok(source.origin()));
            for entry in source {
                // The receiver is gone once the run has failed.
                if entries_tx.blocking_send(entry).is_err() {
                    return;
                }
            }
        });

        let origin = opened_rx.await.map_err(index_task_failed)??;
        debug!(?origin, "index opened");

        let mut batches = self.open(draft).await?;
        while let Some(entry) = entries_rx.recv().await {
            batches.push(entry?).await?;
        }
        // A reader that died early must not publish a short entry list.
        reader.await.map_err(index_task_failed)?;
        batches.finish().await
    }

    async fn open(&self, draft: &AdvertisementDraft) -> Result<Batches<'_, A>> {
        let accumulator = ChunkAccumulator::new(self.batch_size)?;
        let handle = self.api.create(draft).await?;
        debug!(%handle, "advertisement opened");
        Ok(Batches {
            publisher: self,
            handle,
            accumulator,
            chunks: 0,
            entries: 0,
        })
    }

    async fn send(
        &self,
        handle: &EphemeralHandle,
        batch: Vec<ContentHash>,
        chunks: &mut usize,
    ) -> Result<()> {
        let size = batch.len();
        let held = self
            .api
            .append_chunk(handle, &EntryChunk::new(batch))
            .await?;
        *chunks += 1;
        debug!(%handle, chunk = *chunks, entries = size, held, "chunk appended");
        Ok(())
    }
}

/// Entries accumulated for one open advertisement.
struct Batches<'a, A> {
    publisher: &'a Publisher<A>,
    handle: EphemeralHandle,
    accumulator: ChunkAccumulator<ContentHash>,
    chunks: usize,
    entries: usize,
}

impl<A: PublishApi> Batches<'_, A> {
    async fn push(&mut self, entry: IndexEntry) -> Result<()> {
        self.entries += 1;
        if let Some(batch) = self.accumulator.push(entry.hash) {
            self.publisher
                .send(&self.handle, batch, &mut self.chunks)
                .await?;
        }
        Ok(())
    }

    /// Flush the last partial batch and publish.
    async fn finish(mut self) -> Result<PublishReport> {
        if let Some(batch) = self.accumulator.finish() {
            self.publisher
                .send(&self.handle, batch, &mut self.chunks)
                .await?;
        }

        let handle = self.handle;
        let id = self.publisher.api.publish(&handle).await?;
        info!(%handle, %id, chunks = self.chunks, entries = self.entries, "advertisement published");
        Ok(PublishReport {
            id,
            handle,
            chunks: self.chunks,
            entries: self.entries,
        })
    }
}

fn index_task_failed(e: impl std::fmt::Display) -> PublishError {
    PublishError::IndexUnavailable(ArchiveError::Io(std::io::Error::other(format!(
        "index task failed: {e}"
    ))))
}
