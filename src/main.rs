//! simhost server binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────────┐
//!                     │                        SIMHOST                           │
//!                     │                                                          │
//!   Client Request    │  ┌─────────┐    ┌─────────┐    ┌──────────────────────┐  │
//!   ──────────────────┼─▶│   net   │───▶│  http   │───▶│ routing (classifier) │  │
//!                     │  │listener │    │ server  │    └──────────┬───────────┘  │
//!                     │  └─────────┘    └─────────┘               │              │
//!                     │                                           ▼              │
//!                     │               ┌────────┬────────┬───────┬────────┐      │
//!                     │               │ stream │generic │ llsd  │ xmlrpc │ poll │
//!                     │               └────────┴────────┴───────┴────────┘  │   │
//!                     │                     │ grunt work        poll workers◀┘   │
//!   Client Response   │                     ▼                                    │
//!   ◀─────────────────┼──────────────  HttpResponse                            │
//!                     │                                                          │
//!                     │  ┌────────────────────────────────────────────────────┐  │
//!                     │  │ modules: controller → regions → register handlers │  │
//!                     │  └────────────────────────────────────────────────────┘  │
//!                     │  ┌────────┐ ┌──────────────┐ ┌───────────┐             │
//!                     │  │ config │ │observability │ │ lifecycle │             │
//!                     │  └────────┘ └──────────────┘ └───────────┘             │
//!                     └──────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use simhost::config::{load_config, ConfigWatcher, ServerConfig};
use simhost::lifecycle::{signals, start};
use simhost::observability::{logging, metrics};
use simhost::ModuleCatalog;

#[derive(Parser)]
#[command(name = "simhost", version, about = "Simulator host front door")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "simhost starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        poll_workers = config.poll.workers,
        poll_timeout_secs = config.poll.timeout_secs,
        regions = config.regions.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let startup_config = config.clone();
    let handle = start(config, ModuleCatalog::with_builtins()).await?;
    for report in handle.attach_reports() {
        tracing::info!(
            region = %report.region,
            attached = ?report.attached,
            skipped = ?report.skipped,
            failed = ?report.failed,
            "Region ready"
        );
    }

    // Keep the watcher alive for as long as the server runs.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path, startup_config);
            let modules = handle.modules().clone();
            tokio::spawn(async move {
                while let Some(settings) = updates.recv().await {
                    for e in modules.reload_configuration(settings) {
                        tracing::warn!(error = %e, "Module rejected reloaded configuration");
                    }
                }
            });
            match watcher.run() {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                    None
                }
            }
        }
        None => None,
    };

    signals::wait_for_shutdown().await;
    tracing::info!("Shutting down");
    handle.stop().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
