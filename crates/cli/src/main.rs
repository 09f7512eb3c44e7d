//! Command-line publisher for Herald.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use herald_archive::IndexSource;
use herald_client::{PublishClient, Publisher};
use herald_core::config::{AppConfig, PublisherConfig};
use herald_core::hash::decode_hex;
use herald_core::{AdvertisementDraft, ContentHash, ContentId, Metadata};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "herald")]
#[command(about = "Announce the contents of CAR archives as advertisements")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ConfigArgs {
    /// Config file path; its [publisher] section seeds the defaults
    #[arg(long, env = "HERALD_CONFIG", default_value = "config/herald.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish an archive's index as one advertisement
    Publish(PublishArgs),
    /// Print the multihashes an archive would advertise
    Index {
        /// CAR archive to read
        archive: PathBuf,
        /// Stop after this many entries
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Args, Clone)]
struct PublishArgs {
    /// CAR archive to advertise
    archive: PathBuf,
    /// Control-plane base URL
    #[arg(long, env = "HERALD_ENDPOINT")]
    endpoint: Option<String>,
    /// Provider peer id
    #[arg(long, env = "HERALD_PROVIDER")]
    provider: Option<String>,
    /// Retrieval multiaddr (repeatable)
    #[arg(long = "address", value_name = "MULTIADDR")]
    addresses: Vec<String>,
    /// Context id (default: SHA-256 of the archive path)
    #[arg(long)]
    context_id: Option<String>,
    /// Metadata payload as hex
    #[arg(long, value_name = "HEX")]
    metadata: Option<String>,
    /// Metadata protocol id
    #[arg(long)]
    metadata_protocol: Option<u64>,
    /// Publish a removal record for the context id
    #[arg(long, default_value_t = false)]
    rm: bool,
    /// Previous advertisement id (default: the service's current head)
    #[arg(long)]
    previous: Option<String>,
    /// Entries per chunk
    #[arg(long)]
    batch_size: Option<usize>,
    #[command(flatten)]
    config: ConfigArgs,
}

/// Everything needed for one publish run.
#[derive(Debug)]
struct PublishPlan {
    draft: AdvertisementDraft,
    endpoint: String,
    batch_size: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli { command } = Cli::parse();

    match command {
        Commands::Publish(args) => handle_publish_command(&args).await,
        Commands::Index { archive, limit } => handle_index_command(&archive, limit),
    }
}

async fn handle_publish_command(args: &PublishArgs) -> Result<()> {
    let config = load_publisher_config(&args.config.config)?;
    let plan = resolve_plan(args, &config)?;

    let client = PublishClient::new(&plan.endpoint)?;
    let publisher = Publisher::new(client, plan.batch_size)?;
    let report = publisher
        .publish_archive(&plan.draft, &args.archive)
        .await
        .with_context(|| format!("failed to publish {}", args.archive.display()))?;

    tracing::info!(
        handle = %report.handle,
        chunks = report.chunks,
        entries = report.entries,
        "done"
    );
    println!("{}", report.id);
    Ok(())
}

fn handle_index_command(archive: &Path, limit: Option<usize>) -> Result<()> {
    let source = IndexSource::open(archive)
        .with_context(|| format!("failed to read index of {}", archive.display()))?;
    eprintln!("index: {:?}", source.origin());

    for entry in source.take(limit.unwrap_or(usize::MAX)) {
        let entry = entry.context("index iteration failed")?;
        println!("{}\t{}", entry.hash.to_hex(), entry.offset);
    }
    Ok(())
}

/// Read the `[publisher]` section from the config file and `HERALD_` env vars.
fn load_publisher_config(path: &Path) -> Result<PublisherConfig> {
    let mut figment = Figment::new();

    if path.exists() {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("HERALD_").split("__"));

    match figment.extract::<AppConfig>() {
        Ok(config) => Ok(config.publisher),
        Err(_) if !path.exists() => Ok(PublisherConfig::default()),
        Err(err) => Err(anyhow::anyhow!(err).context("failed to load publisher configuration")),
    }
}

/// Combine flags with configured defaults. Flags win.
fn resolve_plan(args: &PublishArgs, config: &PublisherConfig) -> Result<PublishPlan> {
    let merged = PublisherConfig {
        endpoint: args
            .endpoint
            .clone()
            .unwrap_or_else(|| config.endpoint.clone()),
        batch_size: args.batch_size.unwrap_or(config.batch_size),
        provider: args.provider.clone().or_else(|| config.provider.clone()),
        addresses: if args.addresses.is_empty() {
            config.addresses.clone()
        } else {
            args.addresses.clone()
        },
        metadata_protocol: args.metadata_protocol.unwrap_or(config.metadata_protocol),
    };
    merged.validate().map_err(|e| anyhow::anyhow!(e))?;

    let provider = merged
        .provider
        .context("no provider: pass --provider or set publisher.provider")?;
    let context_id = match &args.context_id {
        Some(context_id) => context_id.clone().into_bytes(),
        None => default_context_id(&args.archive),
    };
    let data = match &args.metadata {
        Some(hex) => decode_hex(hex.trim()).context("invalid --metadata hex")?,
        None => Vec::new(),
    };
    let previous = args
        .previous
        .as_deref()
        .map(ContentId::parse)
        .transpose()
        .context("invalid --previous")?;

    let draft = AdvertisementDraft {
        previous,
        provider,
        addresses: merged.addresses,
        context_id,
        metadata: Metadata::new(merged.metadata_protocol, data),
        is_rm: args.rm,
    };
    draft
        .validate()
        .context("advertisement would be rejected")?;

    Ok(PublishPlan {
        draft,
        endpoint: merged.endpoint,
        batch_size: merged.batch_size,
    })
}

/// Fixed-size context id derived from the archive path.
fn default_context_id(archive: &Path) -> Vec<u8> {
    ContentHash::sha2_256(archive.display().to_string().as_bytes())
        .digest()
        .to_vec()
}
