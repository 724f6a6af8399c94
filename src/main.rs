//! telemetryd - resident device telemetry daemon
//!
//! Accumulates usage, crash, and resource-utilization statistics across
//! reboots and reports them as bucketed histogram samples.

use anyhow::Result;
use clap::Parser;
use telemetryd::{app::App, cli::Cli, config::Config};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Layer configuration sources: defaults, file, environment, CLI args.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        eprintln!("failed to load configuration: {err}");
        std::process::exit(1);
    });

    // RUST_LOG overrides the configured level when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("telemetryd starting up");
    info!(state_dir = %config.daemon.state_dir.display(), "state directory");
    info!(
        update_stats_interval_seconds = config.daemon.update_stats_interval_seconds,
        meminfo_interval_seconds = config.daemon.meminfo_interval_seconds,
        "intervals"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = App::builder(config).build(shutdown_rx).await?;

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for shutdown signal: {e}");
            return;
        }
        info!("interrupt received, shutting down gracefully");
        shutdown_tx.send(true).ok();
    });

    app.run().await
}
