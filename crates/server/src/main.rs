//! PhotoSync server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use photosync_core::config::AppConfig;
use photosync_server::bootstrap::ensure_admin;
use photosync_server::error::ApiError;
use photosync_server::scanner::spawn_sweep;
use photosync_server::{AppState, create_router};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// PhotoSync - self-hosted photo backup and multi-device sync
#[derive(Parser, Debug)]
#[command(name = "photosyncd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "PHOTOSYNC_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Start one scheduled sweep. Returns false when a sweep was already running.
fn auto_sweep_tick(state: &AppState) -> bool {
    match spawn_sweep(state) {
        Ok(started_at) => {
            tracing::info!(started_at = %started_at, "Scheduled sweep started");
            true
        }
        Err(ApiError::Conflict(_)) => {
            tracing::debug!("Sweep already running, skipping scheduled run");
            false
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to start scheduled sweep");
            false
        }
    }
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

    tracing::info!("PhotoSync v{}", env!("CARGO_PKG_VERSION"));

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

    // PHOTOSYNC_CONFIG is only the file path
    let has_env_config = std::env::vars()
        .any(|(key, _)| key.starts_with("PHOTOSYNC_") && key != "PHOTOSYNC_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: photosyncd --config /path/to/config.toml\n  \
             2. Environment variables: PHOTOSYNC_STORAGE__PATH=/srv/photos \
             PHOTOSYNC_ADMIN__TOKEN_HASH=sha256:YOUR_TOKEN_HASH_HERE photosyncd\n\n\
             See config/server.example.toml for example configuration.\n\
             Set PHOTOSYNC_CONFIG env var to specify a default config file path."
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("PHOTOSYNC_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;

    photosync_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage = photosync_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(
        backend = storage.backend_name(),
        path = %config.storage.path.display(),
        "Blob store ready"
    );

    let metadata = photosync_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!(path = %config.metadata.path.display(), "Catalog ready");

    let admin_id = ensure_admin(metadata.as_ref(), &config.admin)
        .await
        .context("failed to bootstrap admin account")?;
    tracing::info!(user_id = %admin_id, "Admin account ready");

    let state = AppState::new(config.clone(), storage, metadata);

    if config.scanner.auto_sweep_enabled {
        let sweep_state = state.clone();
        let interval = config.scanner.auto_sweep_interval();
        tokio::spawn(async move {
            tracing::info!(
                interval_secs = interval.as_secs(),
                "Automatic reconciliation sweeps enabled"
            );
            loop {
                tokio::time::sleep(interval).await;
                auto_sweep_tick(&sweep_state);
            }
        });
    } else {
        tracing::info!("Automatic reconciliation sweeps disabled");
    }

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
