//! Advertisement records and their builder.

use crate::codec;
use crate::entry::{EncodedBlock, EntriesRoot, EntryChain, EntryChainBuilder, EntryChunk};
use crate::hash::{ContentHash, ContentId};
use serde::{Deserialize, Serialize};

/// Metadata protocol id used when none is configured.
pub const DEFAULT_METADATA_PROTOCOL: u64 = 0x300010;

/// Maximum context id length in bytes.
pub const MAX_CONTEXT_ID_LEN: usize = 64;

/// Maximum metadata payload length in bytes.
pub const MAX_METADATA_LEN: usize = 1024;

/// Maximum provider id length.
pub const MAX_PROVIDER_LEN: usize = 128;

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Retrieval metadata: a protocol id plus a payload that protocol interprets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub protocol: u64,
    pub data: Vec<u8>,
}

impl Metadata {
    pub fn new(protocol: u64, data: Vec<u8>) -> Self {
        Self { protocol, data }
    }

    /// `varint protocol ‖ data`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = unsigned_varint::encode::u64_buffer();
        let protocol = unsigned_varint::encode::u64(self.protocol, &mut buf);
        let mut out = Vec::with_capacity(protocol.len() + self.data.len());
        out.extend_from_slice(protocol);
        out.extend_from_slice(&self.data);
        out
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new(DEFAULT_METADATA_PROTOCOL, Vec::new())
    }
}

/// Advertisement signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signature {
    /// No signature attached.
    Unsigned,
    /// Opaque signed envelope over [`Advertisement::signature_payload`].
    Envelope(Vec<u8>),
}

/// Produces the signature attached to an advertisement at publish time.
pub trait AdvertisementSigner: Send + Sync {
    fn sign(&self, payload: &ContentHash) -> crate::Result<Signature>;
}

/// Signer that leaves advertisements unsigned.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unsigned;

impl AdvertisementSigner for Unsigned {
    fn sign(&self, _payload: &ContentHash) -> crate::Result<Signature> {
        Ok(Signature::Unsigned)
    }
}

/// The fields of an advertisement known before any entries are sent.
///
/// This is the body of the `create` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisementDraft {
    /// Previous advertisement in the provider's chain.
    pub previous: Option<ContentId>,
    /// Provider peer id.
    pub provider: String,
    /// Multiaddrs the content can be retrieved from.
    pub addresses: Vec<String>,
    /// Scope tag for the entries; a removal record retracts by context id.
    pub context_id: Vec<u8>,
    pub metadata: Metadata,
    /// Retract rather than announce.
    pub is_rm: bool,
}

impl AdvertisementDraft {
    /// Check field formats and sizes.
    pub fn validate(&self) -> crate::Result<()> {
        if self.provider.is_empty() {
            return Err(crate::Error::InvalidAdvertisement(
                "provider is empty".to_string(),
            ));
        }
        if self.provider.len() > MAX_PROVIDER_LEN {
            return Err(crate::Error::InvalidAdvertisement(format!(
                "provider is {} chars (max {MAX_PROVIDER_LEN})",
                self.provider.len()
            )));
        }
        if let Some(c) = self.provider.chars().find(|c| !BASE58_ALPHABET.contains(*c)) {
            return Err(crate::Error::InvalidAdvertisement(format!(
                "provider contains invalid character {c:?}"
            )));
        }
        for (i, addr) in self.addresses.iter().enumerate() {
            if !addr.starts_with('/') || addr.len() < 2 {
                return Err(crate::Error::InvalidAdvertisement(format!(
                    "addresses[{i}]: {addr:?} is not a multiaddr"
                )));
            }
        }
        if self.context_id.is_empty() {
            return Err(crate::Error::InvalidAdvertisement(
                "context id is empty".to_string(),
            ));
        }
        if self.context_id.len() > MAX_CONTEXT_ID_LEN {
            return Err(crate::Error::InvalidAdvertisement(format!(
                "context id is {} bytes (max {MAX_CONTEXT_ID_LEN})",
                self.context_id.len()
            )));
        }
        if self.metadata.data.len() > MAX_METADATA_LEN {
            return Err(crate::Error::InvalidAdvertisement(format!(
                "metadata is {} bytes (max {MAX_METADATA_LEN})",
                self.metadata.data.len()
            )));
        }
        Ok(())
    }

    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        codec::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> crate::Result<Self> {
        codec::decode(bytes)
    }
}

/// An immutable, published advertisement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertisement {
    pub previous: Option<ContentId>,
    pub entries: EntriesRoot,
    pub context_id: Vec<u8>,
    pub metadata: Metadata,
    pub provider: String,
    pub addresses: Vec<String>,
    pub is_rm: bool,
    pub signature: Signature,
}

impl Advertisement {
    /// Digest a signer signs: every field except the signature itself.
    pub fn signature_payload(&self) -> ContentHash {
        let mut payload = Vec::new();
        if let Some(previous) = &self.previous {
            payload.extend_from_slice(&previous.to_bytes());
        }
        if let Some(head) = self.entries.head() {
            payload.extend_from_slice(&head.to_bytes());
        }
        payload.extend_from_slice(self.provider.as_bytes());
        for addr in &self.addresses {
            payload.extend_from_slice(addr.as_bytes());
        }
        payload.extend_from_slice(&self.context_id);
        payload.extend_from_slice(&self.metadata.to_bytes());
        payload.push(u8::from(self.is_rm));
        ContentHash::sha2_256(&payload)
    }

    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        codec::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> crate::Result<Self> {
        codec::decode(bytes)
    }
}

/// Accumulates entry chunks for a draft and produces the final advertisement.
#[derive(Debug)]
pub struct AdvertisementBuilder {
    draft: AdvertisementDraft,
    chain: EntryChainBuilder,
}

impl AdvertisementBuilder {
    pub fn new(draft: AdvertisementDraft) -> Self {
        Self {
            draft,
            chain: EntryChainBuilder::new(),
        }
    }

    pub fn draft(&self) -> &AdvertisementDraft {
        &self.draft
    }

    /// Append an unlinked chunk; returns the number of chunks held.
    pub fn append(&mut self, chunk: EntryChunk) -> crate::Result<usize> {
        if chunk.next.is_some() {
            return Err(crate::Error::InvalidChunk(
                "appended chunks must be unlinked".to_string(),
            ));
        }
        self.chain.push_batch(chunk.entries)?;
        Ok(self.chain.batch_count())
    }

    pub fn chunk_count(&self) -> usize {
        self.chain.batch_count()
    }

    pub fn entry_count(&self) -> usize {
        self.chain.entry_count()
    }

    /// Link the entries and seal the advertisement.
    ///
    /// `previous` is the resolved chain head the record will point at.
    pub fn build(
        self,
        previous: Option<ContentId>,
        signer: &dyn AdvertisementSigner,
    ) -> crate::Result<PublishedAdvertisement> {
        let entries = self.chain.build()?;
        let AdvertisementDraft {
            provider,
            addresses,
            context_id,
            metadata,
            is_rm,
            ..
        } = self.draft;

        let mut advertisement = Advertisement {
            previous,
            entries: entries.root.clone(),
            context_id,
            metadata,
            provider,
            addresses,
            is_rm,
            signature: Signature::Unsigned,
        };
        advertisement.signature = signer.sign(&advertisement.signature_payload())?;

        let block = EncodedBlock::encode(&advertisement)?;
        Ok(PublishedAdvertisement {
            advertisement,
            block,
            entries,
        })
    }
}

/// A sealed advertisement with its encoded record and entries chain.
#[derive(Clone, Debug)]
pub struct PublishedAdvertisement {
    pub advertisement: Advertisement,
    pub block: EncodedBlock,
    pub entries: EntryChain,
}

impl PublishedAdvertisement {
    /// Permanent identifier.
    pub fn id(&self) -> &ContentId {
        &self.block.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> AdvertisementDraft {
        AdvertisementDraft {
            previous: None,
            provider: "12D3KooWHHzSeKaY8xuZVzkLbKFfvNgPPeKhFBGrMbNzbm5akpqu".to_string(),
            addresses: vec!["/ip4/127.0.0.1/tcp/9999".to_string()],
            context_id: b"some-context".to_vec(),
            metadata: Metadata::default(),
            is_rm: false,
        }
    }

    #[test]
    fn test_draft_validation() {
        assert!(draft().validate().is_ok());

        let mut bad = draft();
        bad.provider = "not a peer id".to_string();
        assert!(bad.validate().is_err());

        let mut bad = draft();
        bad.provider.clear();
        assert!(bad.validate().is_err());

        let mut bad = draft();
        bad.addresses.push("127.0.0.1:80".to_string());
        assert!(bad.validate().is_err());

        let mut bad = draft();
        bad.context_id = vec![0; MAX_CONTEXT_ID_LEN + 1];
        assert!(bad.validate().is_err());

        let mut bad = draft();
        bad.metadata.data = vec![0; MAX_METADATA_LEN + 1];
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_draft_roundtrip() {
        let draft = draft();
        assert_eq!(AdvertisementDraft::decode(&draft.encode().unwrap()).unwrap(), draft);
    }

    #[test]
    fn test_build_without_chunks_has_no_entries() {
        let published = AdvertisementBuilder::new(draft())
            .build(None, &Unsigned)
            .unwrap();
        assert_eq!(published.advertisement.entries, EntriesRoot::NoEntries);
        assert_eq!(published.advertisement.signature, Signature::Unsigned);
        assert!(published.entries.blocks.is_empty());

        let decoded = Advertisement::decode(&published.block.data).unwrap();
        assert_eq!(decoded, published.advertisement);
        published.id().verify(&published.block.data).unwrap();
    }

    #[test]
    fn test_build_links_chunks_and_previous() {
        let mut builder = AdvertisementBuilder::new(draft());
        let hashes: Vec<ContentHash> = (0u8..12).map(|i| ContentHash::sha2_256(&[i])).collect();
        assert_eq!(builder.append(EntryChunk::new(hashes[..10].to_vec())).unwrap(), 1);
        assert_eq!(builder.append(EntryChunk::new(hashes[10..].to_vec())).unwrap(), 2);
        assert_eq!(builder.entry_count(), 12);

        let previous = ContentId::of(b"genesis");
        let published = builder.build(Some(previous.clone()), &Unsigned).unwrap();
        assert_eq!(published.advertisement.previous, Some(previous));
        assert_eq!(
            published.advertisement.entries.head(),
            Some(&published.entries.blocks[0].id)
        );
        assert_eq!(published.entries.blocks.len(), 2);
    }

    #[test]
    fn test_append_rejects_linked_chunk() {
        let mut builder = AdvertisementBuilder::new(draft());
        let chunk = EntryChunk {
            entries: vec![ContentHash::sha2_256(b"a")],
            next: Some(ContentId::of(b"b")),
        };
        assert!(builder.append(chunk).is_err());
        assert_eq!(builder.chunk_count(), 0);
    }

    #[test]
    fn test_signature_payload_covers_fields() {
        let base = AdvertisementBuilder::new(draft())
            .build(None, &Unsigned)
            .unwrap()
            .advertisement;
        let mut flipped = base.clone();
        flipped.is_rm = true;
        assert_ne!(base.signature_payload(), flipped.signature_payload());

        let mut other_context = base.clone();
        other_context.context_id = b"other".to_vec();
        assert_ne!(base.signature_payload(), other_context.signature_payload());
    }

    #[test]
    fn test_identical_drafts_publish_identically() {
        let a = AdvertisementBuilder::new(draft()).build(None, &Unsigned).unwrap();
        let b = AdvertisementBuilder::new(draft()).build(None, &Unsigned).unwrap();
        assert_eq!(a.id(), b.id());
    }
}
