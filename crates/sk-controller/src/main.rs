//! Skein Controller Daemon
//!
//! Runs the admin API and supervises the covert-transport listener units.
//! Listeners start only when an operator triggers them through the control
//! surface; the daemon itself comes up with every transport stopped.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sk_core::config::{self, ControllerConfig};
use sk_controller::{control, ControllerState};

#[derive(Parser)]
#[command(name = "sk-controller")]
#[command(about = "Skein controller daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Admin API bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Skein controller starting...");

    let mut controller_config = if let Some(config_path) = &args.config {
        config::load_config::<ControllerConfig>(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_controller_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                ControllerConfig::default()
            })
        } else {
            tracing::info!("Using default configuration");
            ControllerConfig::default()
        }
    };

    if let Some(bind) = args.bind {
        controller_config.admin.bind_addr = bind;
    }

    let state = ControllerState::new(controller_config)
        .context("Failed to initialize controller state")?;
    tracing::info!(
        agents = state.directory.len().await,
        "Agent directory loaded from {:?}",
        state.config.directory_path
    );

    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    let bind_addr = state.config.admin.bind_addr.clone();
    control::serve(bind_addr, state.clone(), cancel).await?;

    // Bring listeners down if an operator left them running
    if state.orchestrator.is_running() {
        if let Err(e) = state.orchestrator.stop_all().await {
            tracing::warn!("Listener shutdown on exit failed: {}", e);
        }
    }

    tracing::info!("Controller shutdown complete");
    Ok(())
}
