//! HTTP control plane for Herald.
//!
//! This crate provides:
//! - Advertisement sessions keyed by ephemeral handle
//! - Entry chunk accumulation and deferred linking at publish
//! - Chain head tracking over a block store
//! - Prometheus metrics and a health endpoint

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
