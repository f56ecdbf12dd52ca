//! fleet-syncd - keeps the local cache of every configured node fresh
//!
//! Loads the configuration, registers the configured nodes, fails tasks a
//! previous process left running and runs the periodic container sync until
//! SIGINT or SIGTERM.

use clap::Parser;
use fleet_sync::{FleetSyncBuilder, FleetSyncConfig, SyncResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// fleet-syncd CLI
#[derive(Parser)]
#[command(name = "fleet-syncd")]
#[command(about = "Mirrors container, NAT, IPv6 and proxy state of remote nodes", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "FLEET_SYNC_CONFIG")]
    config: Option<String>,

    /// Log level, overrides `logging.level`
    #[arg(long, env = "FLEET_SYNC_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "FLEET_SYNC_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> SyncResult<()> {
    let cli = Cli::parse();
    let config = FleetSyncConfig::load(cli.config.as_deref())?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        nodes = config.nodes.len(),
        interval_secs = config.sync.interval_secs,
        "fleet-syncd starting"
    );

    let fleet = FleetSyncBuilder::from_config(&config)?.build().await?;

    let recovered = fleet.recover_stranded().await?;
    if recovered > 0 {
        tracing::warn!(recovered, "failed tasks left running by a previous process");
    }

    fleet.start_periodic();
    shutdown_signal().await;

    tracing::info!("fleet-syncd shutting down");
    fleet.shutdown().await;
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("received terminate signal, initiating graceful shutdown");
        }
    }
}
