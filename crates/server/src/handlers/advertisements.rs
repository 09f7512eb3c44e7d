//! Advertisement control plane: create, append entry chunk, publish.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{
    ADVERTISEMENTS_CREATED, ADVERTISEMENTS_PUBLISHED, ENTRIES_RECEIVED, ENTRY_CHUNKS_APPENDED,
    PUBLISH_DURATION,
};
use crate::state::{AppState, Session, SessionPhase};
use axum::body::Bytes;
use axum::extract::{Path, State};
use herald_core::{
    AdvertisementBuilder, AdvertisementDraft, AdvertisementState, ContentId, EntryChunk,
    EphemeralHandle, Unsigned,
};
use std::time::Instant;
use time::OffsetDateTime;

fn parse_handle(raw: &str) -> ApiResult<EphemeralHandle> {
    EphemeralHandle::parse(raw)
        .map_err(|e| ApiError::BadRequest(format!("invalid advertisement handle: {e}")))
}

/// Pick the record the new advertisement points back at.
///
/// A draft without a previous ref follows the current head. An explicit ref
/// must name the head itself, otherwise the chain would fork.
fn resolve_previous(
    requested: Option<&ContentId>,
    head: Option<&ContentId>,
) -> ApiResult<Option<ContentId>> {
    match (requested, head) {
        (None, head) => Ok(head.cloned()),
        (Some(requested), Some(head)) if requested == head => Ok(Some(head.clone())),
        (Some(requested), head) => Err(ApiError::Conflict(format!(
            "stale previous ref {requested}: chain head is {}",
            head.map_or_else(|| "empty".to_string(), ContentId::to_hex)
        ))),
    }
}

/// POST /create - Open an advertisement and return its handle.
#[tracing::instrument(skip(state, body), fields(handle = tracing::field::Empty))]
pub async fn create_advertisement(State(state): State<AppState>, body: Bytes) -> ApiResult<String> {
    let draft = AdvertisementDraft::decode(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid advertisement draft: {e}")))?;
    draft.validate()?;

    let now = OffsetDateTime::now_utc();
    let handle = EphemeralHandle::new();
    let limit = state.config.server.max_open_sessions;

    {
        let mut registry = state.registry.lock().await;
        registry.expire(now);
        if registry.open_count() >= limit {
            tracing::warn!(limit, "refusing new advertisement");
            return Err(ApiError::TooManySessions { limit });
        }
        registry.insert(
            handle,
            Session {
                phase: SessionPhase::Accumulating(AdvertisementBuilder::new(draft)),
                created_at: now,
                expires_at: state.session_deadline(now),
            },
        );
    }

    tracing::Span::current().record("handle", tracing::field::display(&handle));
    ADVERTISEMENTS_CREATED.inc();
    tracing::info!(%handle, "advertisement created");
    Ok(handle.to_string())
}

/// POST /adv/{handle}/entryChunk - Append one unlinked chunk of entries.
///
/// Answers with the number of chunks now held for the handle.
#[tracing::instrument(skip(state, body))]
pub async fn append_entry_chunk(
    State(state): State<AppState>,
    Path(handle): Path<String>,
    body: Bytes,
) -> ApiResult<String> {
    let handle = parse_handle(&handle)?;
    let chunk = EntryChunk::decode(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid entry chunk: {e}")))?;
    chunk.validate(state.config.server.max_chunk_entries)?;
    let entries = chunk.entries.len();

    let held = {
        let mut registry = state.registry.lock().await;
        let session = registry.live_mut(&handle, OffsetDateTime::now_utc())?;
        session
            .advance(AdvertisementState::Accumulating)?
            .append(chunk)?
    };

    ENTRY_CHUNKS_APPENDED.inc();
    ENTRIES_RECEIVED.inc_by(entries as u64);
    tracing::debug!(entries, held, "entry chunk appended");
    Ok(held.to_string())
}

/// POST /adv/{handle}/publish - Link, store and head the advertisement.
///
/// Chunks are written tail first, then the advertisement record, then the
/// head, so every stored link already resolves when it becomes reachable.
#[tracing::instrument(skip(state))]
pub async fn publish_advertisement(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> ApiResult<String> {
    let start_time = Instant::now();
    let handle = parse_handle(&handle)?;
    let now = OffsetDateTime::now_utc();

    // Held until the head moves so concurrent publishes cannot fork the chain.
    let mut registry = state.registry.lock().await;
    let head = registry.head().cloned();

    let session = registry.live_mut(&handle, now)?;
    let builder = session.advance(AdvertisementState::Published)?;
    let previous = resolve_previous(builder.draft().previous.as_ref(), head.as_ref())?;
    let (created_at, expires_at) = (session.created_at, session.expires_at);

    let Some(Session {
        phase: SessionPhase::Accumulating(builder),
        ..
    }) = registry.remove(&handle)
    else {
        return Err(ApiError::Internal(format!(
            "advertisement {handle} changed while locked"
        )));
    };

    let published = builder.build(previous, &Unsigned)?;
    for block in published.entries.blocks.iter().rev() {
        state.store.put(block).await?;
    }
    state.store.put(&published.block).await?;
    state.store.set_head(published.id()).await?;

    let id = published.id().clone();
    registry.set_head(id.clone());
    registry.insert(
        handle,
        Session {
            phase: SessionPhase::Published(id.clone()),
            created_at,
            expires_at,
        },
    );
    drop(registry);

    PUBLISH_DURATION.observe(start_time.elapsed().as_secs_f64());
    ADVERTISEMENTS_PUBLISHED.inc();
    tracing::info!(
        %id,
        previous = ?published.advertisement.previous.as_ref().map(ContentId::to_hex),
        chunks = published.entries.blocks.len(),
        entries = published.entries.entry_count,
        "advertisement published"
    );
    Ok(id.to_string())
}
