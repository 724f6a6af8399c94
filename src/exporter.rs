//! Prometheus exposition endpoint.
//!
//! When enabled in the configuration, installs the Prometheus recorder as
//! the global `metrics` backend and serves its rendered state over a
//! single-route `axum` server at `/metrics`. The server shuts down cleanly
//! on the application-wide shutdown signal.

use std::future::Future;
use std::net::SocketAddr;

use anyhow::Context;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, trace};

use crate::config::ExporterConfig;

/// A server that exposes metrics to a Prometheus scraper.
pub struct MetricsServer {
    listener: TcpListener,
    prom_handle: PrometheusHandle,
    shutdown_rx: watch::Receiver<bool>,
}

impl MetricsServer {
    pub fn new(
        listener: TcpListener,
        prom_handle: PrometheusHandle,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            listener,
            prom_handle,
            shutdown_rx,
        }
    }

    /// Returns a future that runs the server until a shutdown signal is
    /// received.
    pub fn run(mut self) -> impl Future<Output = ()> {
        let app = Router::new()
            .route("/metrics", get(move || async move { self.prom_handle.render() }));

        async move {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.changed() => {
                    trace!("metrics server received shutdown signal");
                }
                result = axum::serve(self.listener, app.into_make_service()) => {
                    if let Err(e) = result {
                        error!("metrics server error: {e}");
                    }
                }
            }
            trace!("metrics server task finished");
        }
    }
}

/// Installs the Prometheus recorder as the global `metrics` backend and
/// binds the scrape endpoint.
///
/// The listener is bound before the recorder is installed so a bind failure
/// leaves the default recorder in place.
pub async fn install(
    config: &ExporterConfig,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<(MetricsServer, SocketAddr)> {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind metrics exporter to {}", config.listen_addr))?;
    let addr = listener
        .local_addr()
        .context("failed to get local address for metrics exporter")?;

    metrics::set_global_recorder(recorder)
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {e}"))?;

    Ok((MetricsServer::new(listener, handle, shutdown_rx), addr))
}
