//! Publisher pipeline against a recording fake of the control plane.

use async_trait::async_trait;
use herald_archive::{ArchiveError, CarFormat, CarWriter, IndexCodec, IndexEntry, IndexSource};
use herald_client::{PublishApi, PublishError, Publisher, Rejection, Result};
use herald_core::{
    AdvertisementDraft, ContentHash, ContentId, EntryChunk, EphemeralHandle, Metadata,
};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Create,
    Append(Vec<ContentHash>),
    Publish,
}

#[derive(Default)]
struct RecordingApi {
    calls: Mutex<Vec<Call>>,
    fail_create: bool,
    fail_append_at: Option<usize>,
}

impl RecordingApi {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn appended(&self) -> Vec<Vec<ContentHash>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Append(hashes) => Some(hashes),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl PublishApi for RecordingApi {
    async fn create(&self, _draft: &AdvertisementDraft) -> Result<EphemeralHandle> {
        if self.fail_create {
            return Err(PublishError::CreateRejected(Rejection::http(
                503,
                "too many open advertisements",
            )));
        }
        self.calls.lock().unwrap().push(Call::Create);
        Ok(EphemeralHandle::new())
    }

    async fn append_chunk(&self, _handle: &EphemeralHandle, chunk: &EntryChunk) -> Result<usize> {
        assert!(chunk.next.is_none(), "chunks are sent unlinked");
        let mut calls = self.calls.lock().unwrap();
        let appended = calls.iter().filter(|c| matches!(c, Call::Append(_))).count();
        if self.fail_append_at == Some(appended) {
            return Err(PublishError::AppendRejected(Rejection::http(404, "gone")));
        }
        calls.push(Call::Append(chunk.entries.clone()));
        Ok(appended + 1)
    }

    async fn publish(&self, _handle: &EphemeralHandle) -> Result<ContentId> {
        self.calls.lock().unwrap().push(Call::Publish);
        Ok(ContentId::of(b"published"))
    }
}

fn draft() -> AdvertisementDraft {
    AdvertisementDraft {
        previous: None,
        provider: "12D3KooWHHzSeKaY8xuZVzkLbKFfvNgPPeKhFBGrMbNzbm5akpqu".to_string(),
        addresses: vec!["/ip4/1.1.1.1/tcp/1234".to_string()],
        context_id: b"ctx".to_vec(),
        metadata: Metadata::default(),
        is_rm: false,
    }
}

fn entries(n: u32) -> Vec<std::result::Result<IndexEntry, ArchiveError>> {
    (0..n)
        .map(|i| {
            Ok(IndexEntry {
                hash: ContentHash::sha2_256(&i.to_be_bytes()),
                offset: u64::from(i) * 100,
            })
        })
        .collect()
}

#[tokio::test]
async fn test_twenty_five_entries_send_three_chunks_then_publish() {
    let api = RecordingApi::default();
    let publisher = Publisher::new(&api, 10).unwrap();

    let report = publisher.publish_entries(&draft(), entries(25)).await.unwrap();
    assert_eq!(report.chunks, 3);
    assert_eq!(report.entries, 25);
    assert_eq!(report.id, ContentId::of(b"published"));

    let calls = api.calls();
    assert_eq!(calls.len(), 5);
    assert_eq!(calls.first(), Some(&Call::Create));
    assert_eq!(calls.last(), Some(&Call::Publish));

    let sizes: Vec<usize> = api.appended().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![10, 10, 5]);

    let sent: Vec<ContentHash> = api.appended().into_iter().flatten().collect();
    let expected: Vec<ContentHash> = entries(25).into_iter().map(|e| e.unwrap().hash).collect();
    assert_eq!(sent, expected);
}

#[tokio::test]
async fn test_create_failure_stops_the_run() {
    let api = RecordingApi {
        fail_create: true,
        ..RecordingApi::default()
    };
    let publisher = Publisher::new(&api, 10).unwrap();

    let err = publisher
        .publish_entries(&draft(), entries(25))
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::CreateRejected(_)));
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_no_entries_publishes_without_chunks() {
    let api = RecordingApi::default();
    let publisher = Publisher::new(&api, 10).unwrap();

    let report = publisher.publish_entries(&draft(), entries(0)).await.unwrap();
    assert_eq!(report.chunks, 0);
    assert_eq!(api.calls(), vec![Call::Create, Call::Publish]);
}

#[tokio::test]
async fn test_exact_multiple_has_no_partial_chunk() {
    let api = RecordingApi::default();
    let publisher = Publisher::new(&api, 5).unwrap();

    publisher.publish_entries(&draft(), entries(20)).await.unwrap();
    let sizes: Vec<usize> = api.appended().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![5, 5, 5, 5]);
}

#[tokio::test]
async fn test_append_failure_skips_publish() {
    let api = RecordingApi {
        fail_append_at: Some(1),
        ..RecordingApi::default()
    };
    let publisher = Publisher::new(&api, 10).unwrap();

    let err = publisher
        .publish_entries(&draft(), entries(25))
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::AppendRejected(_)));
    assert_eq!(api.appended().len(), 1);
    assert!(!api.calls().contains(&Call::Publish));
}

#[tokio::test]
async fn test_index_error_mid_stream_aborts() {
    let api = RecordingApi::default();
    let publisher = Publisher::new(&api, 10).unwrap();

    let mut input = entries(15);
    input.insert(12, Err(ArchiveError::CorruptIndex("truncated".to_string())));

    let err = publisher.publish_entries(&draft(), input).await.unwrap_err();
    assert!(matches!(err, PublishError::IndexUnavailable(_)));
    assert_eq!(api.appended().len(), 1);
    assert!(!api.calls().contains(&Call::Publish));
}

#[tokio::test]
async fn test_zero_batch_size_rejected() {
    let api = RecordingApi::default();
    assert!(matches!(
        Publisher::new(&api, 0),
        Err(PublishError::Encoding(_))
    ));
}

fn write_archive(dir: &TempDir, blocks: usize, format: CarFormat) -> PathBuf {
    let path = dir.path().join("blocks.car");
    let mut writer = CarWriter::new();
    for i in 0..blocks {
        writer.add_raw(format!("block {i}").into_bytes());
    }
    writer.write_to_path(&path, format).unwrap();
    path
}

fn index_order(path: &Path) -> Vec<ContentHash> {
    IndexSource::open(path)
        .unwrap()
        .map(|entry| entry.unwrap().hash)
        .collect()
}

#[tokio::test]
async fn test_publish_archive_reads_every_block() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(
        &dir,
        25,
        CarFormat::V2 {
            index: Some(IndexCodec::MultihashSorted),
        },
    );

    let api = RecordingApi::default();
    let publisher = Publisher::new(&api, 10).unwrap();
    let report = publisher.publish_archive(&draft(), &path).await.unwrap();
    assert_eq!(report.entries, 25);
    assert_eq!(report.chunks, 3);

    let sent: Vec<ContentHash> = api.appended().into_iter().flatten().collect();
    assert_eq!(sent, index_order(&path));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_publish_archive_stops_reading_after_a_rejected_chunk() {
    let dir = TempDir::new().unwrap();
    let path = write_archive(&dir, 200, CarFormat::V1);

    let api = RecordingApi {
        fail_append_at: Some(2),
        ..RecordingApi::default()
    };
    let publisher = Publisher::new(&api, 5).unwrap();
    let err = publisher.publish_archive(&draft(), &path).await.unwrap_err();

    assert!(matches!(err, PublishError::AppendRejected(_)));
    assert_eq!(api.appended().len(), 2);
    assert!(!api.calls().contains(&Call::Publish));
}

#[tokio::test]
async fn test_missing_archive_never_creates() {
    let dir = TempDir::new().unwrap();
    let api = RecordingApi::default();
    let publisher = Publisher::new(&api, 10).unwrap();

    let err = publisher
        .publish_archive(&draft(), dir.path().join("missing.car"))
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::IndexUnavailable(_)));
    assert!(api.calls().is_empty());
}
