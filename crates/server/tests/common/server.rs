//! Server test utilities.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use herald_core::config::{AppConfig, StoreConfig};
use herald_server::{AppState, create_router};
use herald_store::BlockStore;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server over an in-memory store.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let mut config = AppConfig::default();
        modifier(&mut config);
        Self::start(config, temp_dir).await
    }

    /// Create a test server whose blocks and head live under `dir`.
    pub async fn on_filesystem(dir: &std::path::Path) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let config = AppConfig {
            store: StoreConfig::Filesystem {
                path: dir.to_path_buf(),
            },
            ..AppConfig::default()
        };
        Self::start(config, temp_dir).await
    }

    async fn start(config: AppConfig, temp_dir: TempDir) -> Self {
        herald_server::metrics::register_metrics();
        let store = herald_store::from_config(&config.store)
            .await
            .expect("Failed to create block store");
        let state = AppState::load(config, store)
            .await
            .expect("Failed to load state");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    pub fn store(&self) -> Arc<dyn BlockStore> {
        self.state.store.clone()
    }

    /// POST an octet-stream body; returns status and body text.
    pub async fn post(&self, uri: &str, body: Vec<u8>) -> (StatusCode, String) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/octet-stream")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// GET `uri`; returns status and body text.
    pub async fn get(&self, uri: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&body_bytes).into_owned())
    }

    /// Error code from a JSON error body.
    pub fn error_code(body: &str) -> Option<String> {
        serde_json::from_str::<Value>(body)
            .ok()?
            .get("code")?
            .as_str()
            .map(str::to_string)
    }
}
