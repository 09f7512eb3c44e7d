//! Content hashes (multihashes) and record identifiers.

use multihash_codetable::{Code, MultihashDigest};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Multihash code for SHA-256.
pub const SHA2_256: u64 = 0x12;

/// Multihash code for identity hashes, which inline their data.
pub const IDENTITY: u64 = 0x00;

/// Largest digest accepted in a multihash.
pub const MAX_DIGEST_LEN: usize = 64;

/// Multihash with room for the largest accepted digest.
pub type Multihash = multihash::Multihash<MAX_DIGEST_LEN>;

/// A self-describing content digest (multihash): `varint code ‖ varint len ‖ digest`.
///
/// Equality is byte equality of the code and digest. Ordering is left to the
/// index that produced the hash.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct ContentHash(Multihash);

impl ContentHash {
    /// Create a hash from a multihash code and a raw digest.
    pub fn new(code: u64, digest: Vec<u8>) -> crate::Result<Self> {
        if digest.is_empty() || digest.len() > MAX_DIGEST_LEN {
            return Err(crate::Error::InvalidHash(format!(
                "digest length {} out of range 1..={MAX_DIGEST_LEN}",
                digest.len()
            )));
        }
        Multihash::wrap(code, &digest)
            .map(Self)
            .map_err(|e| crate::Error::InvalidHash(e.to_string()))
    }

    /// Compute the SHA-256 multihash of data.
    pub fn sha2_256(data: &[u8]) -> Self {
        Self(Code::Sha2_256.digest(data))
    }

    /// The multihash function code.
    pub fn code(&self) -> u64 {
        self.0.code()
    }

    /// The raw digest bytes.
    pub fn digest(&self) -> &[u8] {
        self.0.digest()
    }

    pub fn as_multihash(&self) -> &Multihash {
        &self.0
    }

    /// Encode as multihash bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes()
    }

    /// Length of the multihash encoding.
    pub fn encoded_len(&self) -> usize {
        self.0.encoded_len()
    }

    /// Decode a multihash that must span exactly `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        let multihash =
            Multihash::from_bytes(bytes).map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
        if multihash.digest().is_empty() {
            return Err(crate::Error::InvalidHash("empty digest".to_string()));
        }
        Ok(Self(multihash))
    }

    /// Parse from the hex form of the multihash bytes.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        Self::from_bytes(&decode_hex(s)?)
    }

    /// Encode the multihash bytes as lowercase hex.
    pub fn to_hex(&self) -> String {
        encode_hex(&self.to_bytes())
    }
}

impl From<Multihash> for ContentHash {
    fn from(multihash: Multihash) -> Self {
        Self(multihash)
    }
}

impl TryFrom<Vec<u8>> for ContentHash {
    type Error = crate::Error;

    fn try_from(bytes: Vec<u8>) -> crate::Result<Self> {
        Self::from_bytes(&bytes)
    }
}

impl From<ContentHash> for Vec<u8> {
    fn from(hash: ContentHash) -> Self {
        hash.to_bytes()
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "ContentHash({})", &hex[..hex.len().min(20)])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// The permanent identifier of a stored record: the SHA-256 multihash of its
/// canonical encoding.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentId(ContentHash);

impl ContentId {
    /// Compute the identifier of an encoded record.
    pub fn of(encoded: &[u8]) -> Self {
        Self(ContentHash::sha2_256(encoded))
    }

    /// Get the underlying multihash.
    pub fn content_hash(&self) -> &ContentHash {
        &self.0
    }

    /// Identifier bytes (the multihash encoding).
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes()
    }

    /// Check that `encoded` hashes to this identifier.
    pub fn verify(&self, encoded: &[u8]) -> crate::Result<()> {
        let actual = Self::of(encoded);
        if &actual != self {
            return Err(crate::Error::InvalidContentId(format!(
                "expected {self}, got {actual}"
            )));
        }
        Ok(())
    }

    /// Parse from hex.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let hash = ContentHash::from_hex(s.trim())
            .map_err(|e| crate::Error::InvalidContentId(e.to_string()))?;
        if hash.code() != SHA2_256 {
            return Err(crate::Error::InvalidContentId(format!(
                "unsupported multihash code {:#x}",
                hash.code()
            )));
        }
        Ok(Self(hash))
    }

    /// Encode as lowercase hex.
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// Storage key for this identifier, fanned out by prefix.
    pub fn to_object_key(&self) -> String {
        let hex = self.to_hex();
        // Skip the constant 4-char multihash prefix so the fan-out spreads.
        format!("blocks/{}/{}/{}", &hex[4..6], &hex[6..8], hex)
    }
}

impl FromStr for ContentId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "ContentId({})", &hex[..hex.len().min(20)])
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

pub fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn decode_hex(s: &str) -> crate::Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(crate::Error::InvalidHash(format!(
            "odd number of hex chars: {}",
            s.len()
        )));
    }
    s.as_bytes()
        .chunks(2)
        .map(|pair| {
            let hex_str =
                std::str::from_utf8(pair).map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
            u8::from_str_radix(hex_str, 16).map_err(|e| crate::Error::InvalidHash(e.to_string()))
        })
        .collect()
}
