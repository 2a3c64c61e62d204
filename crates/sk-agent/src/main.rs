//! Skein Agent Daemon
//!
//! Brings up one polling loop and one heartbeat loop per enabled channel
//! and runs them until interrupted. When no auth token is configured the
//! agent registers itself over HTTP first and persists the issued token.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sk_agent::{heartbeat_loop, polling_loop, CommandExecutor, EchoExecutor};
use sk_channel::{CovertChannel, DnsChannel, HttpChannel, IcmpChannel, SmbChannel};
use sk_core::config::{self, AgentConfig};
use sk_core::types::AgentId;

#[derive(Parser)]
#[command(name = "sk-agent")]
#[command(about = "Skein agent daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

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

    let config_path = args
        .config
        .unwrap_or_else(config::default_agent_config_path);
    let mut agent_config = if config_path.exists() {
        config::load_config::<AgentConfig>(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        tracing::info!("Using default configuration");
        AgentConfig::default()
    };

    tracing::info!(
        agent_id = %agent_config.agent_id,
        os = std::env::consts::OS,
        "Skein agent starting"
    );

    // First run: obtain a token over HTTP and keep it for every restart
    if agent_config.auth_token.is_none() {
        let token = bootstrap_registration(&agent_config).await?;
        agent_config.auth_token = Some(token);
        if let Err(e) = config::save_config(&config_path, &agent_config) {
            tracing::warn!("Could not persist issued auth token: {}", e);
        }
    }
    let auth_token = agent_config
        .auth_token
        .clone()
        .ok_or_else(|| anyhow!("No auth token available"))?;

    let agent_id = AgentId::new(agent_config.agent_id.clone());
    let executor: Arc<dyn CommandExecutor> = Arc::new(EchoExecutor);
    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    let channels = &agent_config.channels;
    if channels.http.enabled {
        let channel = Arc::new(HttpChannel::new(
            &channels.http.server_url,
            agent_id.as_str(),
            &auth_token,
        ));
        spawn_channel_loops(
            channel,
            &mut tasks,
            &agent_id,
            &executor,
            agent_config.poll_interval(),
            agent_config.heartbeat_interval(),
            &cancel,
        );
    }

    if channels.dns.enabled {
        let channel = Arc::new(DnsChannel::new(
            &channels.dns.server_ip,
            agent_id.as_str(),
            &channels.dns.domain_suffix,
        ));
        spawn_channel_loops(
            channel,
            &mut tasks,
            &agent_id,
            &executor,
            agent_config.poll_interval(),
            agent_config.heartbeat_interval(),
            &cancel,
        );
    }

    if channels.icmp.enabled {
        let channel = Arc::new(IcmpChannel::new(
            &channels.icmp.target_ip,
            agent_id.as_str(),
        ));
        spawn_channel_loops(
            channel,
            &mut tasks,
            &agent_id,
            &executor,
            agent_config.poll_interval(),
            agent_config.heartbeat_interval(),
            &cancel,
        );
    }

    if channels.smb.enabled {
        let channel = Arc::new(SmbChannel::new(
            &channels.smb.share_path,
            &channels.smb.task_file,
            agent_id.as_str(),
        ));
        spawn_channel_loops(
            channel,
            &mut tasks,
            &agent_id,
            &executor,
            agent_config.poll_interval(),
            agent_config.heartbeat_interval(),
            &cancel,
        );
    }

    if tasks.is_empty() {
        tracing::warn!("No channels enabled; agent has nothing to do");
        return Ok(());
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Received Ctrl+C, shutting down...");
    cancel.cancel();

    for task in tasks {
        let _ = task.await;
    }

    tracing::info!("Agent shutdown complete");
    Ok(())
}

/// Register over HTTP and return the issued token. The directory is
/// idempotent, so re-registering an existing agent returns its stored
/// token rather than rotating it.
async fn bootstrap_registration(agent_config: &AgentConfig) -> Result<String> {
    if !agent_config.channels.http.enabled {
        return Err(anyhow!(
            "No auth token configured and the HTTP channel is disabled; cannot register"
        ));
    }

    let server_url = agent_config.channels.http.server_url.trim_end_matches('/');
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    let response = client
        .post(format!("{server_url}/api/agent/register"))
        .json(&serde_json::json!({ "agent_id": agent_config.agent_id }))
        .send()
        .await
        .context("Registration request failed")?
        .error_for_status()
        .context("Registration rejected")?;

    let body: serde_json::Value = response.json().await?;
    let token = body["auth_token"]
        .as_str()
        .ok_or_else(|| anyhow!("Registration response carried no auth token"))?;
    tracing::info!(agent_id = %agent_config.agent_id, "Registered with controller");
    Ok(token.to_string())
}

/// Spawn the channel's polling and heartbeat loops
fn spawn_channel_loops<C: CovertChannel + 'static>(
    channel: Arc<C>,
    tasks: &mut Vec<tokio::task::JoinHandle<()>>,
    agent_id: &AgentId,
    executor: &Arc<dyn CommandExecutor>,
    poll_interval: Duration,
    heartbeat_interval: Duration,
    cancel: &CancellationToken,
) {
    tasks.push(tokio::spawn(polling_loop(
        Arc::clone(&channel),
        Arc::clone(executor),
        agent_id.clone(),
        poll_interval,
        cancel.clone(),
    )));
    tasks.push(tokio::spawn(heartbeat_loop(
        channel,
        heartbeat_interval,
        cancel.clone(),
    )));
}
