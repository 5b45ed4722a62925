//! subhub server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use subhub_core::config::AppConfig;
use subhub_metadata::MetadataStore;
use subhub_server::bootstrap::ensure_admin_token;
use subhub_server::{AppState, create_router};
use time::OffsetDateTime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired subscription cache rows are swept.
const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// subhub - A proxy subscription aggregator
#[derive(Parser, Debug)]
#[command(name = "subhub-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "SUBHUB_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
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

    tracing::info!("subhub v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide/override everything)
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    // SUBHUB_CONFIG only carries the path
    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("SUBHUB_") && key != "SUBHUB_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: subhub-server --config /path/to/config.toml\n  \
             2. Environment variables: SUBHUB_SERVER__BIND=0.0.0.0:8080 \
             SUBHUB_ADMIN__TOKEN_HASH=sha256:YOUR_TOKEN_HASH_HERE subhub-server\n\n\
             See config/server.example.toml for example configuration.\n\
             Set SUBHUB_CONFIG env var to specify a default config file path."
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("SUBHUB_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    subhub_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let metadata = subhub_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    ensure_admin_token(metadata.as_ref(), &config.admin).await?;

    let fetcher =
        subhub_fetch::from_config(&config.fetch).context("failed to initialize upstream fetcher")?;
    tracing::info!(
        timeout_ms = config.fetch.timeout_ms,
        max_bytes = config.fetch.max_bytes,
        "Upstream fetcher initialized"
    );
    if config.fetch.allow_private_hosts {
        tracing::warn!("fetch.allow_private_hosts is enabled, upstreams may reach internal hosts");
    }

    let state = AppState::new(config.clone(), metadata.clone(), fetcher);

    spawn_cache_purge_task(metadata, CACHE_PURGE_INTERVAL);
    tracing::info!(
        interval_secs = CACHE_PURGE_INTERVAL.as_secs(),
        "Cache purge task spawned"
    );

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Delete cache rows whose TTL has elapsed.
///
/// Expired rows are already ignored on read; this only bounds table growth.
async fn purge_expired_cache(metadata: &Arc<dyn MetadataStore>) -> Result<u64> {
    let removed = metadata
        .purge_expired_cache_entries(OffsetDateTime::now_utc())
        .await
        .context("failed to purge expired cache entries")?;
    if removed > 0 {
        tracing::debug!(removed, "Purged expired subscription cache entries");
    }
    Ok(removed)
}

fn spawn_cache_purge_task(metadata: Arc<dyn MetadataStore>, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            if let Err(e) = purge_expired_cache(&metadata).await {
                tracing::error!(error = %e, "Cache purge failed");
            }
        }
    });
}
