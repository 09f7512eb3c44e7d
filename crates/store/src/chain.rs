//! Readers for the linked structures kept in a block store.

use crate::error::{StoreError, StoreResult};
use crate::traits::BlockStore;
use herald_core::{Advertisement, ContentHash, ContentId, EntriesRoot, EntryChunk};
use std::collections::HashSet;

fn decode_err(id: &ContentId) -> impl FnOnce(herald_core::Error) -> StoreError + '_ {
    move |source| StoreError::Decode {
        id: id.to_hex(),
        source,
    }
}

/// Load and decode one advertisement.
pub async fn read_advertisement(
    store: &dyn BlockStore,
    id: &ContentId,
) -> StoreResult<Advertisement> {
    let data = store.get(id).await?;
    Advertisement::decode(&data).map_err(decode_err(id))
}

/// Load every chunk of an entries list, head first.
pub async fn read_entry_chunks(
    store: &dyn BlockStore,
    root: &EntriesRoot,
) -> StoreResult<Vec<(ContentId, EntryChunk)>> {
    let mut chunks = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor = root.head().cloned();

    while let Some(id) = cursor {
        if !seen.insert(id.clone()) {
            return Err(StoreError::Cycle(id.to_hex()));
        }
        let data = store.get(&id).await?;
        let chunk = EntryChunk::decode(&data).map_err(decode_err(&id))?;
        cursor = chunk.next.clone();
        chunks.push((id, chunk));
    }
    Ok(chunks)
}

/// Every content hash reachable from `root`, in list order.
pub async fn read_entries(
    store: &dyn BlockStore,
    root: &EntriesRoot,
) -> StoreResult<Vec<ContentHash>> {
    Ok(read_entry_chunks(store, root)
        .await?
        .into_iter()
        .flat_map(|(_, chunk)| chunk.entries)
        .collect())
}

/// Walk the advertisement chain from `from` towards genesis, newest first.
///
/// Stops after `limit` records when given.
pub async fn advertisement_history(
    store: &dyn BlockStore,
    from: &ContentId,
    limit: Option<usize>,
) -> StoreResult<Vec<(ContentId, Advertisement)>> {
    let mut history = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor = Some(from.clone());

    while let Some(id) = cursor {
        if limit.is_some_and(|limit| history.len() >= limit) {
            break;
        }
        if !seen.insert(id.clone()) {
            return Err(StoreError::Cycle(id.to_hex()));
        }
        let ad = read_advertisement(store, &id).await?;
        cursor = ad.previous.clone();
        history.push((id, ad));
    }
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryBackend;
    use herald_core::{AdvertisementBuilder, AdvertisementDraft, EncodedBlock, Metadata, Unsigned};

    fn draft(context: &str) -> AdvertisementDraft {
        AdvertisementDraft {
            previous: None,
            provider: "12D3KooWHHzSeKaY8xuZVzkLbKFfvNgPPeKhFBGrMbNzbm5akpqu".to_string(),
            addresses: vec!["/ip4/127.0.0.1/tcp/9999".to_string()],
            context_id: context.as_bytes().to_vec(),
            metadata: Metadata::default(),
            is_rm: false,
        }
    }

    async fn publish(
        store: &MemoryBackend,
        context: &str,
        hashes: &[ContentHash],
        previous: Option<ContentId>,
    ) -> ContentId {
        let mut builder = AdvertisementBuilder::new(draft(context));
        for batch in hashes.chunks(10) {
            builder.append(EntryChunk::new(batch.to_vec())).unwrap();
        }
        let published = builder.build(previous, &Unsigned).unwrap();
        for block in &published.entries.blocks {
            store.put(block).await.unwrap();
        }
        store.put(&published.block).await.unwrap();
        published.id().clone()
    }

    fn hashes(n: u32) -> Vec<ContentHash> {
        (0..n).map(|i| ContentHash::sha2_256(&i.to_be_bytes())).collect()
    }

    #[tokio::test]
    async fn test_entries_read_back_in_order() {
        let store = MemoryBackend::new();
        let all = hashes(25);
        let id = publish(&store, "ctx", &all, None).await;

        let ad = read_advertisement(&store, &id).await.unwrap();
        let chunks = read_entry_chunks(&store, &ad.entries).await.unwrap();
        let sizes: Vec<usize> = chunks.iter().map(|(_, c)| c.entries.len()).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(read_entries(&store, &ad.entries).await.unwrap(), all);
    }

    #[tokio::test]
    async fn test_no_entries_reads_empty() {
        let store = MemoryBackend::new();
        assert!(
            read_entries(&store, &EntriesRoot::NoEntries)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_history_is_newest_first() {
        let store = MemoryBackend::new();
        let first = publish(&store, "one", &hashes(3), None).await;
        let second = publish(&store, "two", &hashes(4), Some(first.clone())).await;
        let third = publish(&store, "three", &[], Some(second.clone())).await;

        let history = advertisement_history(&store, &third, None).await.unwrap();
        let ids: Vec<ContentId> = history.iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(ids, vec![third.clone(), second, first]);
        assert!(history[2].1.previous.is_none());

        let limited = advertisement_history(&store, &third, Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_chunk_is_reported() {
        let store = MemoryBackend::new();
        let root = EntriesRoot::Chunk(ContentId::of(b"never stored"));
        assert!(matches!(
            read_entries(&store, &root).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_undecodable_block_is_reported() {
        let store = MemoryBackend::new();
        let block = EncodedBlock::encode(&"not an advertisement").unwrap();
        store.put(&block).await.unwrap();
        assert!(matches!(
            read_advertisement(&store, &block.id).await,
            Err(StoreError::Decode { .. })
        ));
    }
}
