//! CAR container reading and writing.
//!
//! A CARv1 file is a varint-framed dag-cbor header followed by sections of
//! `varint len ‖ cid ‖ block`. A CARv2 file wraps a CARv1 payload between a
//! fixed pragma plus header and an optional trailing index.

use crate::cid::{self, Cid, IDENTITY};
use crate::error::{ArchiveError, Result};
use crate::index::{IndexCodec, IndexEntry, SortedIndex};
use ciborium::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Bytes that open every CARv2 file.
pub const CARV2_PRAGMA: [u8; 11] = [
    0x0a, 0xa1, 0x67, 0x76, 0x65, 0x72, 0x73, 0x69, 0x6f, 0x6e, 0x02,
];

/// Size of the fixed CARv2 header that follows the pragma.
pub const CARV2_HEADER_LEN: u64 = 40;

/// Largest CARv1 header accepted.
const MAX_HEADER_LEN: u64 = 32 * 1024 * 1024;

/// Largest section accepted.
const MAX_SECTION_LEN: u64 = 32 * 1024 * 1024;

/// CBOR tag for an IPLD link.
const CID_TAG: u64 = 42;

/// Container version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CarVersion {
    V1,
    V2,
}

/// Fixed CARv2 header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CarV2Header {
    pub characteristics: [u8; 16],
    /// Byte offset of the CARv1 payload.
    pub data_offset: u64,
    /// Length of the CARv1 payload.
    pub data_size: u64,
    /// Byte offset of the index, or 0 when there is none.
    pub index_offset: u64,
}

impl CarV2Header {
    fn parse(bytes: &[u8; CARV2_HEADER_LEN as usize]) -> Self {
        let word = |at: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[at..at + 8]);
            u64::from_le_bytes(buf)
        };
        let mut characteristics = [0u8; 16];
        characteristics.copy_from_slice(&bytes[..16]);
        Self {
            characteristics,
            data_offset: word(16),
            data_size: word(24),
            index_offset: word(32),
        }
    }

    fn to_bytes(self) -> [u8; CARV2_HEADER_LEN as usize] {
        let mut out = [0u8; CARV2_HEADER_LEN as usize];
        out[..16].copy_from_slice(&self.characteristics);
        out[16..24].copy_from_slice(&self.data_offset.to_le_bytes());
        out[24..32].copy_from_slice(&self.data_size.to_le_bytes());
        out[32..40].copy_from_slice(&self.index_offset.to_le_bytes());
        out
    }
}

/// Read a varint from a stream. Returns `None` on a clean end of stream.
pub(crate) fn read_uvarint<R: BufRead>(reader: &mut R) -> Result<Option<u64>> {
    if reader.fill_buf()?.is_empty() {
        return Ok(None);
    }
    match unsigned_varint::io::read_u64(reader) {
        Ok(value) => Ok(Some(value)),
        Err(unsigned_varint::io::ReadError::Io(e)) => Err(e.into()),
        Err(e) => Err(ArchiveError::InvalidVarint(e.to_string())),
    }
}

/// Append `value` to `out` as an unsigned varint.
pub(crate) fn write_uvarint(value: u64, out: &mut Vec<u8>) {
    let mut buf = unsigned_varint::encode::u64_buffer();
    out.extend_from_slice(unsigned_varint::encode::u64(value, &mut buf));
}

fn uvarint_len(value: u64) -> u64 {
    let mut buf = unsigned_varint::encode::u64_buffer();
    unsigned_varint::encode::u64(value, &mut buf).len() as u64
}

/// Decode a CARv1 dag-cbor header, `{roots: [cid...], version: 1}`, returning the roots.
fn parse_v1_header(header: &[u8]) -> Result<Vec<Cid>> {
    let value: Value = ciborium::de::from_reader(header)
        .map_err(|e| ArchiveError::InvalidHeader(format!("header is not cbor: {e}")))?;
    let Value::Map(fields) = value else {
        return Err(ArchiveError::InvalidHeader(
            "header is not a cbor map".to_string(),
        ));
    };

    let mut version = None;
    let mut roots = Vec::new();
    for (key, value) in fields {
        match (key.as_text(), value) {
            (Some("version"), Value::Integer(v)) => {
                version = Some(u64::try_from(v).map_err(|_| {
                    ArchiveError::InvalidHeader("malformed version".to_string())
                })?);
            }
            (Some("version"), _) => {
                return Err(ArchiveError::InvalidHeader("malformed version".to_string()));
            }
            (Some("roots"), Value::Array(items)) => {
                roots = items.into_iter().map(decode_link).collect::<Result<_>>()?;
            }
            (Some("roots"), _) => {
                return Err(ArchiveError::InvalidHeader("roots is not an array".to_string()));
            }
            _ => {}
        }
    }

    match version {
        Some(1) => Ok(roots),
        Some(v) => Err(ArchiveError::InvalidHeader(format!(
            "unsupported payload version {v}"
        ))),
        None => Err(ArchiveError::InvalidHeader("header has no version".to_string())),
    }
}

/// Decode a tag-42 link: a multibase-identity prefix followed by CID bytes.
fn decode_link(value: Value) -> Result<Cid> {
    let bytes = match value {
        Value::Tag(CID_TAG, inner) => match *inner {
            Value::Bytes(bytes) => bytes,
            _ => return Err(ArchiveError::InvalidHeader("link is not bytes".to_string())),
        },
        _ => return Err(ArchiveError::InvalidHeader("root is not a link".to_string())),
    };
    match bytes.split_first() {
        Some((0x00, link)) => {
            Cid::try_from(link).map_err(|e| ArchiveError::InvalidCid(e.to_string()))
        }
        _ => Err(ArchiveError::InvalidHeader(
            "link lacks the identity multibase prefix".to_string(),
        )),
    }
}

fn encode_link(cid: &Cid) -> Value {
    let mut bytes = vec![0x00];
    bytes.extend_from_slice(&cid.to_bytes());
    Value::Tag(CID_TAG, Box::new(Value::Bytes(bytes)))
}

/// An opened CAR file.
#[derive(Debug)]
pub struct CarReader {
    path: PathBuf,
    version: CarVersion,
    v2_header: Option<CarV2Header>,
    roots: Vec<Cid>,
    /// Absolute offset of the CARv1 payload.
    payload_start: u64,
    /// Absolute offset of the first section.
    sections_start: u64,
    /// Absolute end of the payload, if bounded.
    payload_end: Option<u64>,
}

impl CarReader {
    /// Open a CAR file and read its headers.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = BufReader::new(File::open(&path)?);

        let mut pragma = [0u8; CARV2_PRAGMA.len()];
        let is_v2 = match reader.read_exact(&mut pragma) {
            Ok(()) => pragma == CARV2_PRAGMA,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => false,
            Err(e) => return Err(e.into()),
        };

        let (version, v2_header, payload_start, payload_end) = if is_v2 {
            let mut raw = [0u8; CARV2_HEADER_LEN as usize];
            reader
                .read_exact(&mut raw)
                .map_err(|e| ArchiveError::InvalidHeader(format!("truncated v2 header: {e}")))?;
            let header = CarV2Header::parse(&raw);
            let end = header.data_offset.checked_add(header.data_size).ok_or_else(|| {
                ArchiveError::InvalidHeader("payload range overflows".to_string())
            })?;
            if header.data_offset < CARV2_PRAGMA.len() as u64 + CARV2_HEADER_LEN {
                return Err(ArchiveError::InvalidHeader(format!(
                    "payload offset {} overlaps the header",
                    header.data_offset
                )));
            }
            if header.index_offset != 0 && header.index_offset < end {
                return Err(ArchiveError::InvalidHeader(format!(
                    "index offset {} overlaps the payload",
                    header.index_offset
                )));
            }
            (CarVersion::V2, Some(header), header.data_offset, Some(end))
        } else {
            (CarVersion::V1, None, 0, None)
        };

        reader.seek(SeekFrom::Start(payload_start))?;
        let header_len = read_uvarint(&mut reader)?
            .ok_or_else(|| ArchiveError::InvalidHeader("empty payload".to_string()))?;
        if header_len == 0 || header_len > MAX_HEADER_LEN {
            return Err(ArchiveError::InvalidHeader(format!(
                "header length {header_len} out of range"
            )));
        }
        let mut header = vec![0u8; header_len as usize];
        reader
            .read_exact(&mut header)
            .map_err(|e| ArchiveError::InvalidHeader(format!("truncated header: {e}")))?;
        let roots = parse_v1_header(&header)?;
        let sections_start = reader.stream_position()?;

        Ok(Self {
            path,
            version,
            v2_header,
            roots,
            payload_start,
            sections_start,
            payload_end,
        })
    }

    pub fn version(&self) -> CarVersion {
        self.version
    }

    pub fn v2_header(&self) -> Option<&CarV2Header> {
        self.v2_header.as_ref()
    }

    /// Roots named in the payload header.
    pub fn roots(&self) -> &[Cid] {
        &self.roots
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A reader positioned at the embedded index, if the archive has one.
    pub fn index_reader(&self) -> Result<Option<BufReader<File>>> {
        let Some(offset) = self
            .v2_header
            .map(|h| h.index_offset)
            .filter(|offset| *offset != 0)
        else {
            return Ok(None);
        };
        let mut reader = BufReader::new(File::open(&self.path)?);
        reader.seek(SeekFrom::Start(offset))?;
        Ok(Some(reader))
    }

    /// Iterate the payload's sections from a fresh file handle.
    pub fn sections(&self) -> Result<Sections> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        reader.seek(SeekFrom::Start(self.sections_start))?;
        Ok(Sections {
            reader,
            position: self.sections_start,
            payload_start: self.payload_start,
            payload_end: self.payload_end,
            done: false,
        })
    }
}

/// One block section of a CAR payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    pub cid: Cid,
    /// Offset of the section's length prefix, relative to the payload start.
    pub offset: u64,
    pub data: Vec<u8>,
}

/// Lazy iterator over a payload's sections.
#[derive(Debug)]
pub struct Sections {
    reader: BufReader<File>,
    position: u64,
    payload_start: u64,
    payload_end: Option<u64>,
    done: bool,
}

impl Sections {
    fn read_section(&mut self) -> Result<Option<Section>> {
        let (offset, len) = loop {
            if self.payload_end.is_some_and(|end| self.position >= end) {
                return Ok(None);
            }
            let Some(len) = read_uvarint(&mut self.reader)? else {
                return Ok(None);
            };
            // Zero-length sections appear as padding in some writers.
            if len == 0 {
                self.position += 1;
                continue;
            }
            break (self.position - self.payload_start, len);
        };
        let invalid = |reason: String| ArchiveError::InvalidSection { offset, reason };

        if len > MAX_SECTION_LEN {
            return Err(invalid(format!("length {len} exceeds {MAX_SECTION_LEN}")));
        }
        let end = self.position + uvarint_len(len) + len;
        if self.payload_end.is_some_and(|payload_end| end > payload_end) {
            return Err(invalid("section runs past the payload".to_string()));
        }

        let mut body = vec![0u8; len as usize];
        self.reader
            .read_exact(&mut body)
            .map_err(|e| invalid(format!("truncated: {e}")))?;
        let (cid, cid_len) = cid::read_prefix(&body).map_err(|e| invalid(e.to_string()))?;
        body.drain(..cid_len);
        self.position = end;

        Ok(Some(Section {
            cid,
            offset,
            data: body,
        }))
    }
}

impl Iterator for Sections {
    type Item = Result<Section>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_section() {
            Ok(Some(section)) => Some(Ok(section)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Output layout for [`CarWriter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CarFormat {
    V1,
    /// CARv2, with an index encoded in the given codec or no index.
    V2 { index: Option<IndexCodec> },
}

/// Builds a CAR file from blocks held in memory.
#[derive(Debug, Default)]
pub struct CarWriter {
    roots: Vec<Cid>,
    blocks: Vec<(Cid, Vec<u8>)>,
}

impl CarWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root. When none are added the first block is used.
    pub fn add_root(&mut self, cid: Cid) {
        self.roots.push(cid);
    }

    /// Add a raw block, returning its CID.
    pub fn add_raw(&mut self, data: impl Into<Vec<u8>>) -> Cid {
        let data = data.into();
        let cid = cid::raw(&data);
        self.blocks.push((cid.clone(), data));
        cid
    }

    /// Add a block under an explicit CID.
    pub fn add_block(&mut self, cid: Cid, data: impl Into<Vec<u8>>) {
        self.blocks.push((cid, data.into()));
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    fn header(&self) -> Result<Vec<u8>> {
        let roots: Vec<&Cid> = if self.roots.is_empty() {
            self.blocks.iter().take(1).map(|(cid, _)| cid).collect()
        } else {
            self.roots.iter().collect()
        };

        // Keys in canonical dag-cbor order: shorter first.
        let header = Value::Map(vec![
            (
                Value::Text("roots".to_string()),
                Value::Array(roots.into_iter().map(encode_link).collect()),
            ),
            (Value::Text("version".to_string()), Value::Integer(1u8.into())),
        ]);
        let mut out = Vec::new();
        ciborium::ser::into_writer(&header, &mut out)
            .map_err(|e| ArchiveError::InvalidHeader(e.to_string()))?;
        Ok(out)
    }

    /// Encode the CARv1 payload, returning it and the index entries for its blocks.
    ///
    /// Identity-hashed blocks carry their data in the CID and are left out of
    /// the index.
    fn payload(&self) -> Result<(Vec<u8>, Vec<IndexEntry>)> {
        let header = self.header()?;
        let mut out = Vec::new();
        write_uvarint(header.len() as u64, &mut out);
        out.extend_from_slice(&header);

        let mut entries = Vec::with_capacity(self.blocks.len());
        for (cid, data) in &self.blocks {
            let cid_bytes = cid.to_bytes();
            if cid.hash().code() != IDENTITY {
                entries.push(IndexEntry {
                    hash: cid::content_hash(cid),
                    offset: out.len() as u64,
                });
            }
            write_uvarint((cid_bytes.len() + data.len()) as u64, &mut out);
            out.extend_from_slice(&cid_bytes);
            out.extend_from_slice(data);
        }
        Ok((out, entries))
    }

    /// Write the archive to `writer`.
    pub fn write<W: Write>(&self, writer: &mut W, format: CarFormat) -> Result<()> {
        let (payload, entries) = self.payload()?;
        let index = match format {
            CarFormat::V1 => {
                writer.write_all(&payload)?;
                return Ok(());
            }
            CarFormat::V2 { index } => index,
        };

        let data_offset = CARV2_PRAGMA.len() as u64 + CARV2_HEADER_LEN;
        let data_size = payload.len() as u64;
        let header = CarV2Header {
            characteristics: [0u8; 16],
            data_offset,
            data_size,
            index_offset: if index.is_some() {
                data_offset + data_size
            } else {
                0
            },
        };

        writer.write_all(&CARV2_PRAGMA)?;
        writer.write_all(&header.to_bytes())?;
        writer.write_all(&payload)?;
        if let Some(codec) = index {
            let sorted = SortedIndex::from_entries(entries);
            sorted.write_to(writer, codec)?;
        }
        Ok(())
    }

    /// Write the archive to a file at `path`.
    pub fn write_to_path(&self, path: impl AsRef<Path>, format: CarFormat) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write(&mut writer, format)?;
        writer.flush()?;
        Ok(())
    }
}
