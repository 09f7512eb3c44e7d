//! Ordered, de-duplicated view of an archive's block hashes.

use crate::car::CarReader;
use crate::cid::{self, IDENTITY};
use crate::error::Result;
use crate::index::{self, IndexCodec, IndexEntry, MultihashSortedReader, SortedIndex};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

/// Where an [`IndexSource`] gets its entries from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexOrigin {
    /// Streamed from the archive's embedded multihash-sorted index.
    Embedded,
    /// Rebuilt by scanning the payload.
    Regenerated,
}

enum Entries {
    Embedded(MultihashSortedReader<BufReader<File>>),
    Regenerated(Box<dyn Iterator<Item = IndexEntry> + Send>),
}

/// Lazy sequence of `(hash, offset)` pairs for every block in an archive.
///
/// Identity-hashed blocks are never yielded, whichever way the index was
/// obtained. Iteration is single-pass; reopen the archive to start again.
pub struct IndexSource {
    entries: Entries,
    origin: IndexOrigin,
}

impl IndexSource {
    /// Open an archive and pick an index strategy.
    ///
    /// An embedded multihash-sorted index is streamed directly from the file.
    /// A missing index, or one in any other codec, is regenerated from the
    /// payload.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let car = CarReader::open(path.as_ref())?;

        if let Some(mut reader) = car.index_reader()? {
            let codec = index::read_codec(&mut reader)?;
            if codec.is_iterable() {
                debug!("streaming embedded index");
                return Ok(Self {
                    entries: Entries::Embedded(MultihashSortedReader::new(reader)?),
                    origin: IndexOrigin::Embedded,
                });
            }
            info!(
                codec = codec.code(),
                "embedded index is not iterable, regenerating"
            );
        } else {
            debug!(version = ?car.version(), "archive has no index, regenerating");
        }

        let index = regenerate(&car)?;
        info!(entries = index.len(), "regenerated index");
        Ok(Self {
            entries: Entries::Regenerated(Box::new(index.into_entries())),
            origin: IndexOrigin::Regenerated,
        })
    }

    pub fn origin(&self) -> IndexOrigin {
        self.origin
    }
}

/// Build a sorted index by scanning every section of the payload.
///
/// Identity-hashed blocks carry their data inline and are not indexed.
pub fn regenerate(car: &CarReader) -> Result<SortedIndex> {
    let mut entries = Vec::new();
    for section in car.sections()? {
        let section = section?;
        if section.cid.hash().code() == IDENTITY {
            continue;
        }
        entries.push(IndexEntry {
            offset: section.offset,
            hash: cid::content_hash(&section.cid),
        });
    }
    Ok(SortedIndex::from_entries(entries))
}

impl Iterator for IndexSource {
    type Item = Result<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.entries {
            Entries::Embedded(reader) => loop {
                match reader.next() {
                    Some(Ok(entry)) if entry.hash.code() == IDENTITY => continue,
                    other => break other,
                }
            },
            Entries::Regenerated(entries) => entries.next().map(Ok),
        }
    }
}

impl std::fmt::Debug for IndexSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSource")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Which codec an archive's embedded index uses, if any.
pub fn embedded_codec(path: impl AsRef<Path>) -> Result<Option<IndexCodec>> {
    let car = CarReader::open(path)?;
    match car.index_reader()? {
        Some(mut reader) => Ok(Some(index::read_codec(&mut reader)?)),
        None => Ok(None),
    }
}
