//! The main application logic, decoupled from the entry point.

use crate::{
    config::Config,
    core::{ActiveClock, CpuUsageSource, MonotonicClock, SampleSink, VersionSource},
    emit::MetricsSampleSink,
    exporter,
    scheduler::Scheduler,
    sources::{OsReleaseVersion, ProcStatCpu},
    stats::StatsTracker,
    task_manager::TaskManager,
    throttle::CpuThrottleSampler,
    utils::heartbeat::run_heartbeat,
};
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info, instrument};

/// A handle to the running application, containing all its task handles.
pub struct App {
    task_manager: TaskManager,
    metrics_addr: Option<std::net::SocketAddr>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        self.metrics_addr
    }

    /// Waits for the shutdown signal and then gracefully shuts down all
    /// tasks.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        shutdown_rx.changed().await.ok();
        info!("shutdown signal received, waiting for tasks to complete");

        self.task_manager.shutdown().await;

        info!("all tasks shut down");
        Ok(())
    }
}

/// Builder for the main application.
///
/// Separates constructing the daemon's components from running them, and
/// lets tests swap the kernel-facing collaborators for fakes.
pub struct AppBuilder {
    config: Config,
    sink_override: Option<Arc<dyn SampleSink>>,
    cpu_source_override: Option<Box<dyn CpuUsageSource>>,
    version_source_override: Option<Box<dyn VersionSource>>,
    clock_override: Option<Arc<dyn ActiveClock>>,
    crash_rx_override: Option<async_channel::Receiver<()>>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sink_override: None,
            cpu_source_override: None,
            version_source_override: None,
            clock_override: None,
            crash_rx_override: None,
        }
    }

    /// Overrides the sample sink for testing.
    pub fn sink_override(mut self, sink: Arc<dyn SampleSink>) -> Self {
        self.sink_override = Some(sink);
        self
    }

    /// Overrides the CPU usage source for testing.
    pub fn cpu_source_override(mut self, source: Box<dyn CpuUsageSource>) -> Self {
        self.cpu_source_override = Some(source);
        self
    }

    /// Overrides the OS version source for testing.
    pub fn version_source_override(mut self, source: Box<dyn VersionSource>) -> Self {
        self.version_source_override = Some(source);
        self
    }

    /// Overrides the active-time clock for testing.
    pub fn clock_override(mut self, clock: Arc<dyn ActiveClock>) -> Self {
        self.clock_override = Some(clock);
        self
    }

    /// Replaces the SIGUSR1 listener with an explicit crash channel for
    /// testing.
    pub fn crash_rx_override(mut self, rx: async_channel::Receiver<()>) -> Self {
        self.crash_rx_override = Some(rx);
        self
    }

    /// Builds and initializes all daemon components, returning a runnable
    /// `App`.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        let task_manager = TaskManager::new(shutdown_rx);

        fs::create_dir_all(&config.daemon.state_dir).with_context(|| {
            format!(
                "failed to create state directory {}",
                config.daemon.state_dir.display()
            )
        })?;

        // Exporter first so an installed recorder backs every later sample.
        let metrics_addr = if config.exporter.enabled {
            let (server, addr) =
                exporter::install(&config.exporter, task_manager.get_shutdown_rx()).await?;
            task_manager.spawn("MetricsServer", server.run());
            info!(%addr, "metrics exporter listening");
            Some(addr)
        } else {
            None
        };

        let sink: Arc<dyn SampleSink> = self
            .sink_override
            .unwrap_or_else(|| Arc::new(MetricsSampleSink::new()));
        let clock: Arc<dyn ActiveClock> = self
            .clock_override
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let cpu_source = self
            .cpu_source_override
            .unwrap_or_else(|| Box::new(ProcStatCpu::new(&config.sources.proc_stat_path)));
        let version_source = self
            .version_source_override
            .unwrap_or_else(|| Box::new(OsReleaseVersion::new(&config.sources.os_release_path)));

        let mut tracker = StatsTracker::new(
            &config.daemon.state_dir,
            sink.clone(),
            cpu_source,
            clock.active_seconds(),
        );

        // The version check runs before the boot markers so a crash that
        // rode along with an OS update lands in the new version's epoch.
        tracker.check_version_change(version_source.current_version_hash());

        if StatsTracker::consume_boot_marker(&config.markers.kernel_crash_path) {
            tracker.process_kernel_crash(clock.active_seconds(), Utc::now());
        }
        if StatsTracker::consume_boot_marker(&config.markers.unclean_shutdown_path) {
            tracker.process_unclean_shutdown(clock.active_seconds(), Utc::now());
        }

        let crash_rx = match self.crash_rx_override {
            Some(rx) => rx,
            None => {
                let (tx, rx) = async_channel::unbounded();
                let mut signal_shutdown_rx = task_manager.get_shutdown_rx();
                task_manager.spawn("UserCrashSignal", async move {
                    let mut stream = match signal(SignalKind::user_defined1()) {
                        Ok(stream) => stream,
                        Err(e) => {
                            error!("failed to install SIGUSR1 handler: {e}");
                            return;
                        }
                    };
                    loop {
                        tokio::select! {
                            biased;
                            _ = signal_shutdown_rx.changed() => {
                                info!("crash signal listener received shutdown signal");
                                break;
                            }
                            _ = stream.recv() => {
                                if tx.send(()).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
                rx
            }
        };

        let throttle = CpuThrottleSampler::new(
            &config.sources.scaling_max_freq_path,
            &config.sources.cpuinfo_max_freq_path,
        );

        let scheduler = Scheduler::new(
            tracker,
            throttle,
            clock,
            sink,
            config.sources.meminfo_path.clone(),
            config.sources.zram_dir.clone(),
            Duration::from_secs(config.daemon.update_stats_interval_seconds),
            Duration::from_secs(config.daemon.meminfo_interval_seconds),
            crash_rx,
            task_manager.get_shutdown_rx(),
        );
        task_manager.spawn("Scheduler", scheduler.run());
        let hb_shutdown_rx = task_manager.get_shutdown_rx();
        task_manager.spawn("Scheduler-heartbeat", async move {
            run_heartbeat("Scheduler", hb_shutdown_rx).await
        });

        info!("telemetryd initialized successfully");

        Ok(App {
            task_manager,
            metrics_addr,
        })
    }
}
