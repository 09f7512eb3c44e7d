//! Block identifiers as they appear inside CAR sections.

use crate::error::{ArchiveError, Result};
use herald_core::ContentHash;

pub use ::cid::{Cid, Version};
pub use herald_core::hash::IDENTITY;

/// Multicodec for raw binary blocks.
pub const RAW: u64 = 0x55;
/// Multicodec for dag-pb blocks (implied by CIDv0).
pub const DAG_PB: u64 = 0x70;
/// Multicodec for dag-cbor blocks.
pub const DAG_CBOR: u64 = 0x71;

/// CIDv1 of a raw block, hashed with SHA-256.
pub fn raw(data: &[u8]) -> Cid {
    v1(RAW, &ContentHash::sha2_256(data))
}

/// A CIDv1 over `hash`.
pub fn v1(codec: u64, hash: &ContentHash) -> Cid {
    Cid::new_v1(codec, *hash.as_multihash())
}

/// The block hash a CID names.
pub fn content_hash(cid: &Cid) -> ContentHash {
    ContentHash::from(*cid.hash())
}

/// Parse a CID from the front of `bytes`, returning it and the bytes consumed.
pub fn read_prefix(bytes: &[u8]) -> Result<(Cid, usize)> {
    let mut rest = bytes;
    let cid = Cid::read_bytes(&mut rest).map_err(|e| ArchiveError::InvalidCid(e.to_string()))?;
    Ok((cid, bytes.len() - rest.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_cid_layout() {
        let cid = raw(b"block");
        let bytes = cid.to_bytes();
        assert_eq!(&bytes[..4], &[0x01, 0x55, 0x12, 0x20]);
        assert_eq!(bytes.len(), 36);

        let mut trailing = bytes.clone();
        trailing.extend_from_slice(b"data");
        let (parsed, used) = read_prefix(&trailing).unwrap();
        assert_eq!(parsed, cid);
        assert_eq!(used, 36);
        assert_eq!(content_hash(&parsed), ContentHash::sha2_256(b"block"));
    }

    #[test]
    fn test_v0_cid_is_bare_multihash() {
        let hash = ContentHash::sha2_256(b"dag-pb node");
        let (cid, used) = read_prefix(&hash.to_bytes()).unwrap();
        assert_eq!(cid.version(), Version::V0);
        assert_eq!(cid.codec(), DAG_PB);
        assert_eq!(content_hash(&cid), hash);
        assert_eq!(used, 34);
        assert_eq!(cid.to_bytes(), hash.to_bytes());
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let bytes = [0x02, 0x55, 0x12, 0x01, 0xff];
        assert!(read_prefix(&bytes).is_err());
        assert!(read_prefix(&[]).is_err());
    }
}
