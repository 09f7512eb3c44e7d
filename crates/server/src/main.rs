//! Herald control-plane server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use herald_core::config::AppConfig;
use herald_server::{AppState, create_router};
use std::net::SocketAddr;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Herald - advertisement publishing service
#[derive(Parser, Debug)]
#[command(name = "heraldd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "HERALD_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Merge the optional TOML file with `HERALD_` environment overrides.
fn load_config(config_path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if Path::new(config_path).exists() {
        tracing::info!(config_path, "Loading configuration from file");
        figment = figment.merge(Toml::file(config_path));
    } else {
        tracing::info!(config_path, "No config file found, using defaults and environment");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("HERALD_").ignore(&["config"]).split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;
    Ok(config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Herald v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    herald_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let store = herald_store::from_config(&config.store)
        .await
        .context("failed to initialize block store")?;
    store
        .health_check()
        .await
        .context("block store health check failed")?;
    tracing::info!(backend = store.backend_name(), "Block store initialized");

    let state = AppState::load(config.clone(), store)
        .await
        .context("failed to read chain head")?;

    let _sweeper = state.spawn_session_sweeper();
    tracing::info!(
        timeout_secs = config.server.session_timeout_secs,
        interval_secs = state.sweep_interval().as_secs(),
        "Session sweeper spawned"
    );

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
