//! OpsPulse Realtime Server
//!
//! Run with: cargo run --bin opspulse
//!
//! # Configuration
//!
//! Settings come from a TOML file (`--config`, or the default locations) with
//! environment overrides:
//! - `OPSPULSE_HOST` / `OPSPULSE_PORT`: bind address (default: 0.0.0.0:8082)
//! - `OPSPULSE_JWT_SECRET`: HS256 secret for client tokens (required)
//! - `OPSPULSE_IDENTITY_URL`: identity service base URL
//! - `OPSPULSE_PROVIDER_URL`: realtime data provider base URL
//! - `OPSPULSE_WORKERS`: concurrent push ticks
//! - `OPSPULSE_LOG_LEVEL` / `OPSPULSE_LOG_FORMAT`: logging (`RUST_LOG` wins)

use anyhow::Context;
use clap::Parser;
use opspulse::api::{serve, AppState};
use opspulse::auth::{HttpIdentityService, IdentityService};
use opspulse::config::{Config, LoggingConfig};
use opspulse::provider::{HttpRealtimeProvider, RealtimeDataProvider};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "opspulse")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time operational metrics over WebSocket")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load_default(),
    };

    config.validate().context("invalid configuration")?;
    if args.check {
        println!("Configuration OK ({})", config.server.addr());
        return Ok(());
    }

    init_tracing(&config.logging);

    tracing::info!("Starting OpsPulse realtime server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        provider = %config.provider.url,
        identity = %config.auth.identity_url,
        workers = config.realtime.workers,
        "Collaborators configured"
    );

    let provider: Arc<dyn RealtimeDataProvider> = Arc::new(
        HttpRealtimeProvider::new(config.provider.provider_config())
            .context("building data provider client")?,
    );
    let identity: Arc<dyn IdentityService> = Arc::new(
        HttpIdentityService::new(config.auth.identity_config())
            .context("building identity service client")?,
    );

    let state = AppState::new(&config, provider, identity);
    serve(state, &config.server).await?;

    tracing::info!("OpsPulse realtime server stopped");
    Ok(())
}

/// Install the global subscriber; `RUST_LOG` overrides the configured level
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("opspulse={},tower_http=info", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
