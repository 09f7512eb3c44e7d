//! Application state shared across handlers.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{OPEN_SESSIONS, SESSIONS_EXPIRED};
use herald_core::config::AppConfig;
use herald_core::{AdvertisementBuilder, AdvertisementState, ContentId, EphemeralHandle};
use herald_store::{BlockStore, StoreResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Contents of one session.
#[derive(Debug)]
pub enum SessionPhase {
    /// Still accepting entry chunks.
    Accumulating(AdvertisementBuilder),
    /// Kept after publish so a repeated publish answers with a conflict.
    Published(ContentId),
}

/// An advertisement being built under an ephemeral handle.
#[derive(Debug)]
pub struct Session {
    pub phase: SessionPhase,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl Session {
    pub fn state(&self) -> AdvertisementState {
        match self.phase {
            SessionPhase::Accumulating(_) => AdvertisementState::Accumulating,
            SessionPhase::Published(_) => AdvertisementState::Published,
        }
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }

    /// Check that the session may move to `to` and return the builder the
    /// move acts on. Published sessions answer with a conflict.
    pub fn advance(&mut self, to: AdvertisementState) -> ApiResult<&mut AdvertisementBuilder> {
        let checked = self.state().transition(to);
        match (&mut self.phase, checked) {
            (SessionPhase::Accumulating(builder), Ok(_)) => Ok(builder),
            (SessionPhase::Published(id), _) => Err(ApiError::Conflict(format!(
                "advertisement already published as {id}"
            ))),
            (SessionPhase::Accumulating(_), Err(e)) => Err(ApiError::Conflict(e.to_string())),
        }
    }
}

/// Session table plus the provider's chain head.
///
/// Both sit behind one lock so that publishes are serialised and the head
/// can never fork.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: HashMap<EphemeralHandle, Session>,
    head: Option<ContentId>,
}

impl Registry {
    pub fn new(head: Option<ContentId>) -> Self {
        Self {
            sessions: HashMap::new(),
            head,
        }
    }

    pub fn head(&self) -> Option<&ContentId> {
        self.head.as_ref()
    }

    pub fn set_head(&mut self, id: ContentId) {
        self.head = Some(id);
    }

    /// Number of handles still accepting chunks.
    pub fn open_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|session| session.state().accepts_chunks())
            .count()
    }

    pub fn insert(&mut self, handle: EphemeralHandle, session: Session) {
        if session.state().accepts_chunks() {
            OPEN_SESSIONS.inc();
        }
        self.sessions.insert(handle, session);
    }

    /// Look up a live session. Expired sessions are dropped and answer as unknown.
    pub fn live_mut(
        &mut self,
        handle: &EphemeralHandle,
        now: OffsetDateTime,
    ) -> ApiResult<&mut Session> {
        if self
            .sessions
            .get(handle)
            .is_some_and(|session| session.is_expired(now))
        {
            self.drop_session(handle);
        }
        self.sessions
            .get_mut(handle)
            .ok_or_else(|| ApiError::NotFound(format!("unknown advertisement handle {handle}")))
    }

    /// Remove a session outright.
    pub fn remove(&mut self, handle: &EphemeralHandle) -> Option<Session> {
        let session = self.sessions.remove(handle)?;
        if session.state().accepts_chunks() {
            OPEN_SESSIONS.dec();
        }
        Some(session)
    }

    /// Drop every session whose deadline has passed. Returns how many were
    /// still unpublished.
    pub fn expire(&mut self, now: OffsetDateTime) -> usize {
        let expired: Vec<EphemeralHandle> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.is_expired(now))
            .map(|(handle, _)| *handle)
            .collect();

        expired
            .iter()
            .filter(|handle| self.drop_session(handle))
            .count()
    }

    fn drop_session(&mut self, handle: &EphemeralHandle) -> bool {
        match self.remove(handle) {
            Some(session) if !session.state().is_terminal() => {
                SESSIONS_EXPIRED.inc();
                tracing::debug!(%handle, "unpublished advertisement expired");
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Block store holding entry chunks, advertisements and the head.
    pub store: Arc<dyn BlockStore>,
    /// Sessions and chain head.
    pub registry: Arc<Mutex<Registry>>,
}

impl AppState {
    /// Create the state with a known chain head.
    pub fn new(config: AppConfig, store: Arc<dyn BlockStore>, head: Option<ContentId>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            registry: Arc::new(Mutex::new(Registry::new(head))),
        }
    }

    /// Create the state, reading the chain head from the store.
    pub async fn load(config: AppConfig, store: Arc<dyn BlockStore>) -> StoreResult<Self> {
        let head = store.head().await?;
        match &head {
            Some(id) => tracing::info!(head = %id, "resuming advertisement chain"),
            None => tracing::info!("no advertisement published yet"),
        }
        Ok(Self::new(config, store, head))
    }

    /// Deadline for a session opened at `now`.
    pub fn session_deadline(&self, now: OffsetDateTime) -> OffsetDateTime {
        now.saturating_add(self.config.server.session_timeout())
    }

    /// How often the sweeper runs: a quarter of the timeout, between 1 and 60 seconds.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs((self.config.server.session_timeout_secs / 4).clamp(1, 60))
    }

    /// Drop expired sessions as of `now`. Returns how many unpublished ones went.
    pub async fn expire_sessions(&self, now: OffsetDateTime) -> usize {
        self.registry.lock().await.expire(now)
    }

    /// Spawn the background task that expires abandoned handles.
    pub fn spawn_session_sweeper(&self) -> JoinHandle<()> {
        let state = self.clone();
        let interval = self.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let expired = state.expire_sessions(OffsetDateTime::now_utc()).await;
                if expired > 0 {
                    tracing::info!(expired, "expired abandoned advertisements");
                }
            }
        })
    }
}
