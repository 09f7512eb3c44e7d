//! Block indexes: the multihash-sorted codec and its in-memory builder.
//!
//! A multihash-sorted index groups records by multihash code, then by record
//! width (digest length plus an 8-byte offset); records inside a bucket are
//! sorted by digest. All integers are little-endian:
//!
//! ```text
//! i32 code_count
//!   u64 code
//!   i32 bucket_count
//!     u32 width
//!     i64 byte_len
//!     [digest ‖ u64 offset] * (byte_len / width)
//! ```

use crate::car::{read_uvarint, write_uvarint};
use crate::error::{ArchiveError, Result};
use herald_core::ContentHash;
use herald_core::hash::MAX_DIGEST_LEN;
use std::collections::BTreeMap;
use std::io::{BufRead, Read, Write};

/// Multicodec of the multihash-sorted index.
pub const MULTIHASH_INDEX_SORTED: u64 = 0x0401;
/// Multicodec of the digest-only sorted index.
pub const INDEX_SORTED: u64 = 0x0400;

const OFFSET_LEN: usize = 8;

/// Encoding of an embedded index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexCodec {
    /// Keyed by full multihash; supports iteration.
    MultihashSorted,
    /// Keyed by digest only; the hash function is lost, so it cannot be iterated.
    Sorted,
    Other(u64),
}

impl IndexCodec {
    pub fn code(self) -> u64 {
        match self {
            Self::MultihashSorted => MULTIHASH_INDEX_SORTED,
            Self::Sorted => INDEX_SORTED,
            Self::Other(code) => code,
        }
    }

    pub fn from_code(code: u64) -> Self {
        match code {
            MULTIHASH_INDEX_SORTED => Self::MultihashSorted,
            INDEX_SORTED => Self::Sorted,
            other => Self::Other(other),
        }
    }

    /// Whether entries can be read back as (hash, offset) pairs.
    pub fn is_iterable(self) -> bool {
        matches!(self, Self::MultihashSorted)
    }
}

/// Read the codec that prefixes an index.
pub fn read_codec<R: BufRead>(reader: &mut R) -> Result<IndexCodec> {
    read_uvarint(reader)?
        .map(IndexCodec::from_code)
        .ok_or_else(|| ArchiveError::CorruptIndex("missing index codec".to_string()))
}

/// One index record: a block's hash and its section offset in the payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub hash: ContentHash,
    pub offset: u64,
}

type Buckets = BTreeMap<usize, Vec<(Vec<u8>, u64)>>;

/// An index built in memory, in multihash-sorted order with duplicates removed.
#[derive(Debug, Default)]
pub struct SortedIndex {
    codes: BTreeMap<u64, Buckets>,
    len: usize,
}

impl SortedIndex {
    /// Build from entries in any order.
    ///
    /// When a hash occurs more than once the first offset seen is kept.
    pub fn from_entries(entries: impl IntoIterator<Item = IndexEntry>) -> Self {
        let mut codes: BTreeMap<u64, Buckets> = BTreeMap::new();
        for IndexEntry { hash, offset } in entries {
            codes
                .entry(hash.code())
                .or_default()
                .entry(hash.digest().len())
                .or_default()
                .push((hash.digest().to_vec(), offset));
        }

        let mut len = 0;
        for bucket in codes.values_mut().flat_map(|b| b.values_mut()) {
            bucket.sort_by(|a, b| a.0.cmp(&b.0));
            bucket.dedup_by(|next, kept| next.0 == kept.0);
            len += bucket.len();
        }
        Self { codes, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = IndexEntry> + '_ {
        self.codes.iter().flat_map(|(code, buckets)| {
            buckets.values().flatten().filter_map(move |(digest, offset)| {
                ContentHash::new(*code, digest.clone())
                    .ok()
                    .map(|hash| IndexEntry {
                        hash,
                        offset: *offset,
                    })
            })
        })
    }

    /// Consume the index, yielding entries in index order.
    pub fn into_entries(self) -> impl Iterator<Item = IndexEntry> {
        self.codes.into_iter().flat_map(|(code, buckets)| {
            buckets
                .into_values()
                .flatten()
                .filter_map(move |(digest, offset)| {
                    ContentHash::new(code, digest)
                        .ok()
                        .map(|hash| IndexEntry { hash, offset })
                })
        })
    }

    /// Serialize as `varint codec ‖ body`.
    ///
    /// [`IndexCodec::Other`] writes the codec with an empty body.
    pub fn write_to<W: Write>(&self, writer: &mut W, codec: IndexCodec) -> Result<()> {
        let mut prefix = Vec::new();
        write_uvarint(codec.code(), &mut prefix);
        writer.write_all(&prefix)?;

        match codec {
            IndexCodec::MultihashSorted => {
                writer.write_all(&count_i32(self.codes.len())?.to_le_bytes())?;
                for (code, buckets) in &self.codes {
                    writer.write_all(&code.to_le_bytes())?;
                    write_buckets(writer, buckets)?;
                }
            }
            IndexCodec::Sorted => {
                let mut merged = Buckets::new();
                for buckets in self.codes.values() {
                    for (width, records) in buckets {
                        merged
                            .entry(*width)
                            .or_default()
                            .extend(records.iter().cloned());
                    }
                }
                for records in merged.values_mut() {
                    records.sort_by(|a, b| a.0.cmp(&b.0));
                    records.dedup_by(|next, kept| next.0 == kept.0);
                }
                write_buckets(writer, &merged)?;
            }
            IndexCodec::Other(_) => {}
        }
        Ok(())
    }
}

fn count_i32(n: usize) -> Result<i32> {
    i32::try_from(n).map_err(|_| ArchiveError::CorruptIndex(format!("{n} buckets overflow i32")))
}

fn write_buckets<W: Write>(writer: &mut W, buckets: &Buckets) -> Result<()> {
    writer.write_all(&count_i32(buckets.len())?.to_le_bytes())?;
    for (digest_len, records) in buckets {
        let width = (digest_len + OFFSET_LEN) as u32;
        let byte_len = (records.len() * (digest_len + OFFSET_LEN)) as i64;
        writer.write_all(&width.to_le_bytes())?;
        writer.write_all(&byte_len.to_le_bytes())?;
        for (digest, offset) in records {
            writer.write_all(digest)?;
            writer.write_all(&offset.to_le_bytes())?;
        }
    }
    Ok(())
}

/// Streams entries out of a serialized multihash-sorted index.
///
/// Adjacent duplicate hashes are dropped.
#[derive(Debug)]
pub struct MultihashSortedReader<R> {
    reader: R,
    codes_left: u32,
    code: u64,
    buckets_left: u32,
    digest_len: usize,
    records_left: u64,
    previous: Option<ContentHash>,
    done: bool,
}

impl<R: Read> MultihashSortedReader<R> {
    /// Start reading an index body. `reader` must be positioned after the codec.
    pub fn new(mut reader: R) -> Result<Self> {
        let codes = read_count(&mut reader, "code count")?;
        Ok(Self {
            reader,
            codes_left: codes,
            code: 0,
            buckets_left: 0,
            digest_len: 0,
            records_left: 0,
            previous: None,
            done: false,
        })
    }

    fn next_record(&mut self) -> Result<Option<IndexEntry>> {
        loop {
            if self.records_left > 0 {
                let mut digest = vec![0u8; self.digest_len];
                read_exact(&mut self.reader, &mut digest, "record digest")?;
                let offset = u64::from_le_bytes(read_array(&mut self.reader, "record offset")?);
                self.records_left -= 1;
                let hash = ContentHash::new(self.code, digest)?;
                return Ok(Some(IndexEntry { hash, offset }));
            }
            if self.buckets_left > 0 {
                let width = u32::from_le_bytes(read_array(&mut self.reader, "bucket width")?) as usize;
                let byte_len = i64::from_le_bytes(read_array(&mut self.reader, "bucket length")?);
                if width <= OFFSET_LEN || width - OFFSET_LEN > MAX_DIGEST_LEN {
                    return Err(ArchiveError::CorruptIndex(format!(
                        "record width {width} out of range"
                    )));
                }
                let byte_len = u64::try_from(byte_len).map_err(|_| {
                    ArchiveError::CorruptIndex(format!("negative bucket length {byte_len}"))
                })?;
                if byte_len % width as u64 != 0 {
                    return Err(ArchiveError::CorruptIndex(format!(
                        "bucket length {byte_len} is not a multiple of width {width}"
                    )));
                }
                self.digest_len = width - OFFSET_LEN;
                self.records_left = byte_len / width as u64;
                self.buckets_left -= 1;
                continue;
            }
            if self.codes_left > 0 {
                self.code = u64::from_le_bytes(read_array(&mut self.reader, "code")?);
                self.buckets_left = read_count(&mut self.reader, "bucket count")?;
                self.codes_left -= 1;
                continue;
            }
            return Ok(None);
        }
    }
}

impl<R: Read> Iterator for MultihashSortedReader<R> {
    type Item = Result<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.next_record() {
                Ok(Some(entry)) => {
                    if self.previous.as_ref() == Some(&entry.hash) {
                        continue;
                    }
                    self.previous = Some(entry.hash.clone());
                    return Some(Ok(entry));
                }
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            ArchiveError::CorruptIndex(format!("truncated while reading {what}"))
        }
        _ => ArchiveError::Io(e),
    })
}

fn read_array<R: Read, const N: usize>(reader: &mut R, what: &str) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    read_exact(reader, &mut buf, what)?;
    Ok(buf)
}

fn read_count<R: Read>(reader: &mut R, what: &str) -> Result<u32> {
    let count = i32::from_le_bytes(read_array(reader, what)?);
    u32::try_from(count).map_err(|_| ArchiveError::CorruptIndex(format!("negative {what} {count}")))
}
