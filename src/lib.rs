//! Container Resource Exporter: per-container cgroup v2 and memory-map metrics for
//! Prometheus.
//!
//! Every scrape interval the exporter asks the CRI runtime for the running containers of
//! the node, attributes host processes to them through `/proc/<pid>/cgroup`, reads the
//! cgroup v2 interface files of each container and the `smaps` report of each attributed
//! process, and exposes the result on `/metrics`.
//!
//! The filesystem side is read-only and unprivileged apart from needing read access to
//! other processes' `/proc` entries.
use std::sync::Arc;

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

pub mod cgroup;
pub mod cli;
pub mod config;
pub mod container;
pub mod correlator;
pub mod error;
pub mod fsutil;
pub mod inventory;
pub mod metrics;
pub mod procfs;
pub mod scheduler;
pub mod server;

pub use error::{Error, Result};

/// Generated client and messages of the CRI `runtime.v1` API.
pub mod runtime {
    pub mod v1 {
        tonic::include_proto!("runtime.v1");
    }
}

use config::Config;
use inventory::CriInventory;
use metrics::Metrics;
use procfs::ProcFs;
use scheduler::{CollectionContext, Scheduler};
use server::MetricsServer;

/// Initializes `env_logger`.
///
/// `RUST_LOG` takes precedence; otherwise the configured `log_level` is used, falling
/// back to `info` when no configuration is available or the level is unknown.
pub fn init_logging(config: Option<&Config>) {
    let level = config.and_then(Config::level_filter);
    env_logger::Builder::new()
        .filter_level(level.unwrap_or(log::LevelFilter::Info))
        .parse_default_env()
        .init();

    if let Some(config) = config {
        if level.is_none() {
            log::warn!("Unknown log level `{}`, using info", config.log_level);
        }
    }
}

/// Runs the exporter until SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns an error if the metrics cannot be registered, a signal handler cannot be
/// installed or the HTTP server cannot bind or fails.
pub async fn run(config: Config) -> Result<()> {
    log::info!(
        "Starting exporter (cgroup root {}, proc root {}, CRI socket {})",
        config.cgroup_root.display(),
        config.proc_root.display(),
        config.cri_socket.display()
    );
    let metrics = Arc::new(Metrics::new()?);

    let token = CancellationToken::new();
    cancel_on_signal(token.clone())?;

    let inventory = CriInventory::new(&config.cri_socket, config.filters.clone());
    let context = CollectionContext::new(
        config.cgroup_root.clone(),
        ProcFs::new(&config.proc_root),
        config.filters.clone(),
        Arc::clone(&metrics),
    );
    let scheduler = Scheduler::new(inventory, context, config.scrape_interval);
    let collector = tokio::spawn(scheduler.run(token.clone()));

    let result = MetricsServer::new(metrics)
        .listen(config.address, token.clone())
        .await;

    token.cancel();
    if let Err(err) = collector.await {
        log::error!("Collection task failed: {}", err);
    }
    log::info!("Shut down");

    result
}

/// Cancels `token` on the first SIGINT or SIGTERM.
fn cancel_on_signal(token: CancellationToken) -> Result<()> {
    let mut terminate = signal(SignalKind::terminate()).map_err(Error::Signal)?;
    let mut interrupt = signal(SignalKind::interrupt()).map_err(Error::Signal)?;

    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => log::info!("Received SIGINT, shutting down"),
            _ = terminate.recv() => log::info!("Received SIGTERM, shutting down"),
            _ = token.cancelled() => return,
        }
        token.cancel();
    });

    Ok(())
}
