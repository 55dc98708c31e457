//! Archway Daemon - event-driven archive mirroring service
//!
//! Watches a structured directory tree and ships every settled batch of
//! files to the remote archive host:
//! - builds the watch tree over the configured root
//! - aggregates file-close events per directory
//! - runs the remote sync protocol for each batch on blocking tasks
//! - records transfer statistics to the date-rotating log
//!
//! Startup order matters: configuration is validated and the archive host
//! preflighted *before* any watch is registered, so a misconfigured daemon
//! never starts consuming events. Shutdown is graceful on SIGINT: the
//! dispatch loop stops, pending aggregation windows are cancelled, and the
//! statistics log is flushed.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use archway_core::config::Config;
use archway_core::ports::{BatchDispatcher, FaultReporter, LogFaultReporter};
use archway_stats::StatisticsRecorder;
use archway_sync::{OrchestratorDispatcher, RemoteSession, SyncOrchestrator};
use archway_watch::{AggregationScheduler, NotifyProvider, WatchTree};

/// Event-based mirroring of a watched directory tree to a remote archive.
#[derive(Debug, Parser)]
#[command(name = "archwayd", version, about)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,
}

fn init_tracing(level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    init_tracing(&config.logging.level);
    info!(config = %cli.config.display(), "configuration loaded");

    // Fatal at startup: bad templates, missing watch root, invalid patterns
    config.validate().context("configuration validation failed")?;
    let config = Arc::new(config);

    preflight(Arc::clone(&config)).await?;

    let faults: Arc<dyn FaultReporter> = Arc::new(LogFaultReporter);
    let recorder = Arc::new(StatisticsRecorder::new(
        config.stats_template(),
        config.statistics.frequency,
    ));
    let orchestrator = Arc::new(SyncOrchestrator::new(
        Arc::clone(&config),
        Arc::clone(&recorder),
        faults,
    ));
    let dispatcher: Arc<dyn BatchDispatcher> =
        Arc::new(OrchestratorDispatcher::new(orchestrator));
    let scheduler = AggregationScheduler::new(config.aggregation_delay(), dispatcher);

    let (provider, events) = NotifyProvider::new()?;
    let mut tree = WatchTree::new(
        provider,
        &config.source.watch,
        config.exclude_regex()?,
        scheduler,
    );
    tree.create();
    info!(root = %config.source.watch.display(), "waiting for notifications");

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                signal_token.cancel();
            }
            Err(err) => error!(error = %err, "cannot listen for the shutdown signal"),
        }
    });

    tree.run(events, shutdown).await;

    if let Err(err) = recorder.flush() {
        error!(error = %err, "could not flush the statistics log");
    }
    info!("archwayd stopped");
    Ok(())
}

/// Verifies the archive host is reachable with the provisioned keys before
/// a single watch is registered.
async fn preflight(config: Arc<Config>) -> Result<()> {
    info!(host = %config.target.host, "checking the connection to the archive host");
    tokio::task::spawn_blocking(move || RemoteSession::connect(&config.target))
        .await
        .context("preflight task failed")?
        .context("cannot reach the archive host")?;
    info!("archive host is reachable");
    Ok(())
}
