//! hoistd - self-update daemon
//!
//! Keeps one managed service up to date: runs scheduled update cycles, serves
//! the localhost admin API for `hoistctl`, and shuts down without interrupting
//! a cycle that has already started mutating the installation.

use anyhow::Result;
use clap::Parser;
use hoist_common::atomic::recover_interrupted_swap;
use hoist_common::paths::config_path;
use hoist_common::{UpdateClient, UpdateConfig};
use hoistd::scheduler::Scheduler;
use hoistd::server::{self, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hoistd")]
#[command(about = "hoist self-update daemon", long_about = None)]
#[command(version)]
struct Args {
    /// Config file (default: $HOIST_CONFIG or /etc/hoist/hoist.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let path = config_path(args.config.as_deref());
    info!("hoistd v{} starting (config {})", env!("CARGO_PKG_VERSION"), path.display());

    if let Err(e) = UpdateConfig::save_default_if_missing(&path) {
        warn!("Could not write default config to {}: {}", path.display(), e);
    }
    let config = UpdateConfig::load(&path);
    for warning in config.validate() {
        warn!("Config: {}", warning);
    }

    // A crash mid-swap is settled before anything else looks at the tree
    match recover_interrupted_swap(&config.install_dir) {
        Ok(outcome) => info!("Installation tree check: {:?}", outcome),
        Err(e) => error!("Could not settle interrupted swap: {}", e),
    }

    let client = Arc::new(UpdateClient::new(path));
    let shutdown = CancellationToken::new();

    let scheduler = tokio::spawn(Scheduler::new(client.clone(), shutdown.clone()).run());
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let admin = server::run(
        AppState::new(client.clone(), shutdown.clone()),
        &config.admin_listen,
    )
    .await;
    if let Err(e) = &admin {
        error!("Admin API stopped: {:#}", e);
        shutdown.cancel();
    }

    if let Err(e) = scheduler.await {
        error!("Scheduler task failed: {}", e);
    }
    if client.is_busy() {
        info!("Waiting for the running update cycle to finish");
    }
    client.wait_idle().await;
    info!("hoistd stopped");
    admin
}

async fn wait_for_signal(shutdown: CancellationToken) {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            None
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
        _ = async {
            match terminate.as_mut() {
                Some(stream) => { stream.recv().await; }
                None => std::future::pending::<()>().await,
            }
        } => info!("Received SIGTERM"),
    }
    shutdown.cancel();
}
