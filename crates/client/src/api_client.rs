//! Control-plane calls: create, append entry chunk, publish.

use crate::error::{PublishError, Rejection, Result};
use async_trait::async_trait;
use herald_core::{AdvertisementDraft, ContentId, EntryChunk, EphemeralHandle};
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

/// The three remote operations that build one advertisement.
///
/// A handle returned by [`create`](Self::create) is threaded through every
/// later call and is only valid for the advertisement it was created for.
#[async_trait]
pub trait PublishApi: Send + Sync {
    /// Open an advertisement under construction.
    async fn create(&self, draft: &AdvertisementDraft) -> Result<EphemeralHandle>;

    /// Append one unlinked chunk. Returns the number of chunks the service holds.
    async fn append_chunk(&self, handle: &EphemeralHandle, chunk: &EntryChunk) -> Result<usize>;

    /// Finalize the advertisement and return its permanent identifier.
    async fn publish(&self, handle: &EphemeralHandle) -> Result<ContentId>;
}

#[async_trait]
impl<T: PublishApi + ?Sized> PublishApi for &T {
    async fn create(&self, draft: &AdvertisementDraft) -> Result<EphemeralHandle> {
        (**self).create(draft).await
    }

    async fn append_chunk(&self, handle: &EphemeralHandle, chunk: &EntryChunk) -> Result<usize> {
        (**self).append_chunk(handle, chunk).await
    }

    async fn publish(&self, handle: &EphemeralHandle) -> Result<ContentId> {
        (**self).publish(handle).await
    }
}

/// JSON error body returned by the service.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// HTTP implementation of [`PublishApi`].
#[derive(Clone, Debug)]
pub struct PublishClient {
    http: reqwest::Client,
    base_url: Url,
}

impl PublishClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PublishError::InvalidEndpoint(format!("{base_url}: {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| PublishError::InvalidEndpoint(format!("{path}: {e}")))
    }

    /// POST an octet-stream body and return the text response.
    async fn post(&self, url: Url, body: Vec<u8>) -> std::result::Result<String, Rejection> {
        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| Rejection::transport(e.to_string()))?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let message = match serde_json::from_str::<ErrorBody>(&text) {
                Ok(body) => format!("{}: {}", body.code, body.message),
                Err(_) => text,
            };
            return Err(Rejection::http(status.as_u16(), message));
        }
        Ok(text)
    }
}

#[async_trait]
impl PublishApi for PublishClient {
    async fn create(&self, draft: &AdvertisementDraft) -> Result<EphemeralHandle> {
        let url = self.url("/create")?;
        let body = self
            .post(url, draft.encode()?)
            .await
            .map_err(PublishError::CreateRejected)?;
        let handle = EphemeralHandle::parse(&body).map_err(|e| {
            PublishError::CreateRejected(Rejection::http(200, format!("malformed handle: {e}")))
        })?;
        debug!(%handle, "created advertisement");
        Ok(handle)
    }

    async fn append_chunk(&self, handle: &EphemeralHandle, chunk: &EntryChunk) -> Result<usize> {
        let url = self.url(&format!("/adv/{handle}/entryChunk"))?;
        let body = self
            .post(url, chunk.encode()?)
            .await
            .map_err(PublishError::AppendRejected)?;
        body.trim().parse().map_err(|_| {
            PublishError::AppendRejected(Rejection::http(200, format!("malformed ack: {body:?}")))
        })
    }

    async fn publish(&self, handle: &EphemeralHandle) -> Result<ContentId> {
        let url = self.url(&format!("/adv/{handle}/publish"))?;
        let body = self
            .post(url, Vec::new())
            .await
            .map_err(PublishError::PublishRejected)?;
        ContentId::parse(&body).map_err(|e| {
            PublishError::PublishRejected(Rejection::http(200, format!("malformed identifier: {e}")))
        })
    }
}
