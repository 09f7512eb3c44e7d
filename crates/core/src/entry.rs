//! Entry chunks and the linked list that carries an advertisement's entries.

use crate::codec;
use crate::hash::{ContentHash, ContentId, MAX_DIGEST_LEN};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One node of an advertisement's entries list.
///
/// `next` names the node that follows in traversal order, or is `None` at the
/// tail. Chunks sent over the control plane are unlinked; the service links
/// them when the advertisement is published.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryChunk {
    /// Content hashes in index order.
    pub entries: Vec<ContentHash>,
    /// Link to the next chunk.
    pub next: Option<ContentId>,
}

impl EntryChunk {
    /// Create an unlinked chunk.
    pub fn new(entries: Vec<ContentHash>) -> Self {
        Self {
            entries,
            next: None,
        }
    }

    /// Check the chunk is non-empty, within `max_entries`, and well formed.
    pub fn validate(&self, max_entries: usize) -> crate::Result<()> {
        if self.entries.is_empty() {
            return Err(crate::Error::InvalidChunk("chunk has no entries".to_string()));
        }
        if self.entries.len() > max_entries {
            return Err(crate::Error::InvalidChunk(format!(
                "chunk has {} entries (max {max_entries})",
                self.entries.len()
            )));
        }
        if let Some((i, _)) = self
            .entries
            .iter()
            .enumerate()
            .find(|(_, h)| h.digest().is_empty() || h.digest().len() > MAX_DIGEST_LEN)
        {
            return Err(crate::Error::InvalidChunk(format!(
                "entries[{i}]: digest length out of range"
            )));
        }
        Ok(())
    }

    /// Canonical encoding.
    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        codec::encode(self)
    }

    /// Decode from the canonical encoding.
    pub fn decode(bytes: &[u8]) -> crate::Result<Self> {
        codec::decode(bytes)
    }
}

/// Root of an advertisement's entries list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntriesRoot {
    /// The advertisement carries no entries (genesis or removal records).
    NoEntries,
    /// Head chunk of the list.
    Chunk(ContentId),
}

impl EntriesRoot {
    /// Whether this is the "no entries" sentinel.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::NoEntries)
    }

    /// The head chunk, if any.
    pub fn head(&self) -> Option<&ContentId> {
        match self {
            Self::NoEntries => None,
            Self::Chunk(id) => Some(id),
        }
    }
}

/// A record together with its identifier and canonical bytes.
#[derive(Clone, Debug)]
pub struct EncodedBlock {
    pub id: ContentId,
    pub data: Bytes,
}

impl EncodedBlock {
    /// Encode a record and derive its identifier.
    pub fn encode<T: Serialize>(value: &T) -> crate::Result<Self> {
        let data = codec::encode(value)?;
        Ok(Self {
            id: ContentId::of(&data),
            data: Bytes::from(data),
        })
    }
}

/// Collects batches in traversal order and links them into an entries list.
///
/// A node's `next` can only be computed once its successor is encoded, so
/// [`build`](Self::build) walks the batches tail-to-head.
#[derive(Debug, Default)]
pub struct EntryChainBuilder {
    batches: Vec<Vec<ContentHash>>,
    entry_count: usize,
}

impl EntryChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch after all batches pushed so far.
    pub fn push_batch(&mut self, batch: Vec<ContentHash>) -> crate::Result<()> {
        if batch.is_empty() {
            return Err(crate::Error::InvalidChunk("empty batch".to_string()));
        }
        self.entry_count += batch.len();
        self.batches.push(batch);
        Ok(())
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Link every batch into a chain whose head holds the first batch.
    pub fn build(self) -> crate::Result<EntryChain> {
        let mut blocks = Vec::with_capacity(self.batches.len());
        let mut next: Option<ContentId> = None;

        for entries in self.batches.into_iter().rev() {
            let block = EncodedBlock::encode(&EntryChunk { entries, next })?;
            next = Some(block.id.clone());
            blocks.push(block);
        }
        blocks.reverse();

        let root = match next {
            Some(head) => EntriesRoot::Chunk(head),
            None => EntriesRoot::NoEntries,
        };
        Ok(EntryChain {
            root,
            blocks,
            entry_count: self.entry_count,
        })
    }
}

/// A linked entries list ready to be stored.
#[derive(Clone, Debug)]
pub struct EntryChain {
    /// Root to reference from the advertisement.
    pub root: EntriesRoot,
    /// Encoded chunks, head first.
    pub blocks: Vec<EncodedBlock>,
    /// Total number of entries across all chunks.
    pub entry_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashes(range: std::ops::Range<u32>) -> Vec<ContentHash> {
        range
            .map(|i| ContentHash::sha2_256(&i.to_le_bytes()))
            .collect()
    }

    #[test]
    fn test_entry_chunk_roundtrip() {
        let chunk = EntryChunk {
            entries: hashes(0..10),
            next: Some(ContentId::of(b"tail")),
        };
        let decoded = EntryChunk::decode(&chunk.encode().unwrap()).unwrap();
        assert_eq!(decoded.entries, chunk.entries);
        assert_eq!(decoded, chunk);
    }

    #[test]
    fn test_entry_chunk_validate() {
        assert!(EntryChunk::new(hashes(0..3)).validate(10).is_ok());
        assert!(EntryChunk::new(vec![]).validate(10).is_err());
        assert!(EntryChunk::new(hashes(0..11)).validate(10).is_err());
    }

    #[test]
    fn test_empty_chain_has_no_entries() {
        let chain = EntryChainBuilder::new().build().unwrap();
        assert_eq!(chain.root, EntriesRoot::NoEntries);
        assert!(chain.root.is_empty());
        assert!(chain.blocks.is_empty());
        assert_eq!(chain.entry_count, 0);
    }

    #[test]
    fn test_chain_links_head_to_tail_in_push_order() {
        let all = hashes(0..25);
        let mut builder = EntryChainBuilder::new();
        for batch in all.chunks(10) {
            builder.push_batch(batch.to_vec()).unwrap();
        }
        assert_eq!(builder.batch_count(), 3);
        let chain = builder.build().unwrap();
        assert_eq!(chain.entry_count, 25);
        assert_eq!(chain.root.head(), Some(&chain.blocks[0].id));

        let mut walked = Vec::new();
        let mut cursor = chain.root.head().cloned();
        let mut visited = 0;
        while let Some(id) = cursor {
            let block = chain.blocks.iter().find(|b| b.id == id).unwrap();
            id.verify(&block.data).unwrap();
            let chunk = EntryChunk::decode(&block.data).unwrap();
            walked.extend(chunk.entries);
            cursor = chunk.next;
            visited += 1;
        }
        assert_eq!(visited, 3);
        assert_eq!(walked, all);
    }

    #[test]
    fn test_chain_is_deterministic() {
        let build = || {
            let mut builder = EntryChainBuilder::new();
            builder.push_batch(hashes(0..4)).unwrap();
            builder.push_batch(hashes(4..6)).unwrap();
            builder.build().unwrap()
        };
        assert_eq!(build().root, build().root);
    }

    #[test]
    fn test_push_batch_rejects_empty() {
        let mut builder = EntryChainBuilder::new();
        assert!(builder.push_batch(Vec::new()).is_err());
        assert_eq!(builder.batch_count(), 0);
    }
}
