//! fieldsync server binary.

use anyhow::{Context, Result};
use clap::Parser;
use fieldsync_core::config::AppConfig;
use fieldsync_server::sweep::spawn_sweep_task;
use fieldsync_server::{AppState, create_router};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// fieldsync - upload reconciliation server for field photo capture
#[derive(Parser, Debug)]
#[command(name = "fieldsyncd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "FIELDSYNC_CONFIG",
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

    tracing::info!("fieldsync v{}", env!("CARGO_PKG_VERSION"));

    // The file is optional; every setting has a default and env vars override.
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::info!(
            "No config file found at {}, using defaults and environment",
            args.config
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("FIELDSYNC_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;

    fieldsync_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage = fieldsync_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(root = %storage.root().display(), "Upload storage ready");

    let state = AppState::with_defaults(config.clone(), storage)
        .await
        .context("failed to initialize reconstruction watch root")?;

    let sweep_interval = config.sessions.sweep_interval();
    spawn_sweep_task(state.clone(), sweep_interval);
    tracing::info!(
        interval_secs = sweep_interval.as_secs(),
        ttl_secs = config.sessions.ttl_secs,
        "Session sweep task spawned"
    );

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
