//! Prometheus metrics for the Herald control plane.
//!
//! Exposes counters for the advertisement lifecycle and publish latency. No
//! handles, providers or identifiers appear in labels.
//!
//! The `/metrics` endpoint is unauthenticated and should only be reachable
//! from the scraper's network.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Advertisement lifecycle
pub static ADVERTISEMENTS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "herald_advertisements_created_total",
        "Total number of advertisement handles allocated",
    )
    .expect("metric creation failed")
});

pub static ADVERTISEMENTS_PUBLISHED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "herald_advertisements_published_total",
        "Total number of advertisements published",
    )
    .expect("metric creation failed")
});

pub static SESSIONS_EXPIRED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "herald_sessions_expired_total",
        "Total number of unpublished handles dropped after the session timeout",
    )
    .expect("metric creation failed")
});

pub static OPEN_SESSIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "herald_open_sessions",
        "Advertisements currently accepting entry chunks",
    )
    .expect("metric creation failed")
});

// Entries
pub static ENTRY_CHUNKS_APPENDED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "herald_entry_chunks_appended_total",
        "Total number of entry chunks appended",
    )
    .expect("metric creation failed")
});

pub static ENTRIES_RECEIVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "herald_entries_received_total",
        "Total number of content hashes received in entry chunks",
    )
    .expect("metric creation failed")
});

// Timing
pub static PUBLISH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "herald_publish_duration_seconds",
            "Time taken to link, store and head an advertisement",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    )
    .expect("metric creation failed")
});

// Errors
pub static REQUEST_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "herald_request_errors_total",
            "Total number of failed control-plane requests by error code",
        ),
        &["code"],
    )
    .expect("metric creation failed")
});

static REGISTER: Once = Once::new();

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(ADVERTISEMENTS_CREATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ADVERTISEMENTS_PUBLISHED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SESSIONS_EXPIRED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(OPEN_SESSIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ENTRY_CHUNKS_APPENDED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ENTRIES_RECEIVED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PUBLISH_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REQUEST_ERRORS.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Count a failed request by its error code.
pub fn record_request_error(code: &str) {
    REQUEST_ERRORS.with_label_values(&[code]).inc();
}
