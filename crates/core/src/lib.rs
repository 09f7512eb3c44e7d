//! Core domain types and shared logic for Herald.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content hashes (multihashes) and record identifiers
//! - The canonical record encoding
//! - Entry chunks and the linked entries list
//! - Advertisements, drafts and the advertisement builder
//! - Ephemeral handles and their lifecycle
//! - Shared configuration

pub mod advertisement;
pub mod batch;
pub mod codec;
pub mod config;
pub mod entry;
pub mod error;
pub mod handle;
pub mod hash;

pub use advertisement::{
    Advertisement, AdvertisementBuilder, AdvertisementDraft, AdvertisementSigner, Metadata,
    PublishedAdvertisement, Signature, Unsigned,
};
pub use batch::{ChunkAccumulator, DEFAULT_BATCH_SIZE};
pub use entry::{EncodedBlock, EntriesRoot, EntryChain, EntryChainBuilder, EntryChunk};
pub use error::{Error, Result};
pub use handle::{AdvertisementState, EphemeralHandle};
pub use hash::{ContentHash, ContentId};
