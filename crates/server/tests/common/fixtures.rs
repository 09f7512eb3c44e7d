//! Test fixtures for advertisements, chunks and archives.

use herald_archive::{CarFormat, CarWriter};
use herald_core::{AdvertisementDraft, ContentHash, ContentId, EntryChunk, Metadata};
use std::path::Path;

pub const PROVIDER: &str = "12D3KooWHHzSeKaY8xuZVzkLbKFfvNgPPeKhFBGrMbNzbm5akpqu";

/// A valid draft with a context id derived from `context`.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn draft(context: &str) -> AdvertisementDraft {
    AdvertisementDraft {
        previous: None,
        provider: PROVIDER.to_string(),
        addresses: vec!["/ip4/127.0.0.1/tcp/4001".to_string()],
        context_id: context.as_bytes().to_vec(),
        metadata: Metadata::default(),
        is_rm: false,
    }
}

/// A draft pointing at an explicit previous advertisement.
#[allow(dead_code)]
pub fn draft_after(context: &str, previous: &ContentId) -> AdvertisementDraft {
    AdvertisementDraft {
        previous: Some(previous.clone()),
        ..draft(context)
    }
}

/// `count` distinct hashes starting at `seed`.
#[allow(dead_code)]
pub fn hashes(seed: u32, count: u32) -> Vec<ContentHash> {
    (seed..seed + count)
        .map(|i| ContentHash::sha2_256(&i.to_be_bytes()))
        .collect()
}

/// Encoded unlinked chunk of `count` hashes.
#[allow(dead_code)]
pub fn chunk_body(seed: u32, count: u32) -> Vec<u8> {
    EntryChunk::new(hashes(seed, count)).encode().unwrap()
}

/// Write a CAR of `blocks` distinct raw blocks to `path`.
#[allow(dead_code)]
pub fn write_car(path: &Path, blocks: usize, format: CarFormat) {
    let mut writer = CarWriter::new();
    for i in 0..blocks {
        writer.add_raw(format!("herald test block {i}").into_bytes());
    }
    writer.write_to_path(path, format).unwrap();
}
