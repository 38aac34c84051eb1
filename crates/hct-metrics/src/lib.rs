//! ---
//! hct_section: "03-persistence-logging"
//! hct_subsection: "module"
//! hct_type: "source"
//! hct_scope: "code"
//! hct_description: "Metrics collection and export utilities."
//! hct_version: "v0.1.0"
//! hct_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{
    GaugeVec, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across the agent.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Spawn an HTTP server that exposes the registry at `/metrics`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get({
            let registry = registry.clone();
            move || metrics_handler(registry.clone())
        }),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let bound = std_listener
        .local_addr()
        .with_context(|| "failed to resolve metrics listener address")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %bound, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr: bound,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("metrics encoding error"),
            )
                .into_response()
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Return the bound address for convenience.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Metrics recorded by the daemon process itself.
#[derive(Clone)]
pub struct DaemonMetrics {
    registry: SharedRegistry,
    starts_total: IntCounter,
    config_load_seconds: Histogram,
    build_info: GaugeVec,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "hctd_starts_total",
            "Total number of times the update daemon has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.001, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "hctd_config_load_seconds",
                "Time spent loading and validating configuration",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        let build_info = GaugeVec::new(
            Opts::new("hctd_build_info", "Build metadata for the running daemon binary"),
            &["version", "git_sha", "profile"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            registry,
            starts_total,
            config_load_seconds,
            build_info,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, seconds: f64) {
        self.config_load_seconds.observe(seconds);
    }

    pub fn set_build_info(&self, version: &str, git_sha: &str, profile: &str) {
        self.build_info
            .with_label_values(&[version, git_sha, profile])
            .set(1.0);
    }
}

/// Per-run counters of the update orchestrator.
#[derive(Clone, Debug)]
pub struct UpdateMetrics {
    registry: SharedRegistry,
    runs_total: IntCounterVec,
    run_duration: HistogramVec,
    downloaded_bytes: IntCounterVec,
}

impl UpdateMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let runs_total = IntCounterVec::new(
            Opts::new(
                "hct_update_runs_total",
                "Orchestration runs by component and terminal status",
            ),
            &["component", "status"],
        )?;
        registry.register(Box::new(runs_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.05, 2.0, 14)
            .context("failed to construct histogram buckets")?;
        let run_duration = HistogramVec::new(
            HistogramOpts::new(
                "hct_update_duration_seconds",
                "Wall time of orchestration runs by component",
            )
            .buckets(buckets),
            &["component"],
        )?;
        registry.register(Box::new(run_duration.clone()))?;

        let downloaded_bytes = IntCounterVec::new(
            Opts::new(
                "hct_downloaded_bytes_total",
                "Artifact bytes written to disk by component",
            ),
            &["component"],
        )?;
        registry.register(Box::new(downloaded_bytes.clone()))?;

        Ok(Self {
            registry,
            runs_total,
            run_duration,
            downloaded_bytes,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_run(&self, component: &str, status: &str, seconds: f64) {
        self.runs_total
            .with_label_values(&[component, status])
            .inc();
        self.run_duration
            .with_label_values(&[component])
            .observe(seconds);
    }

    pub fn record_download(&self, component: &str, bytes: u64) {
        self.downloaded_bytes
            .with_label_values(&[component])
            .inc_by(bytes);
    }

    /// Number of runs recorded for `component` ending in `status`.
    pub fn runs(&self, component: &str, status: &str) -> u64 {
        self.runs_total.with_label_values(&[component, status]).get()
    }
}

pub use prometheus;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_metrics_count_runs() {
        let metrics = UpdateMetrics::new(new_registry()).unwrap();
        metrics.record_run("core", "ok", 1.5);
        metrics.record_run("core", "ok", 0.5);
        metrics.record_run("api", "error", 0.1);
        metrics.record_download("core", 4096);
        assert_eq!(metrics.runs("core", "ok"), 2);
        assert_eq!(metrics.runs("api", "error"), 1);
        assert_eq!(metrics.runs("hcc", "ok"), 0);
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = new_registry();
        UpdateMetrics::new(registry.clone()).unwrap();
        assert!(UpdateMetrics::new(registry).is_err());
    }

    #[tokio::test]
    async fn exporter_serves_registered_metrics() {
        let registry = new_registry();
        let metrics = UpdateMetrics::new(registry.clone()).unwrap();
        metrics.record_run("hcc", "no_update", 0.2);

        let server = spawn_http_server(registry, "127.0.0.1:0".parse().unwrap()).unwrap();
        let body = reqwest::get(format!("http://{}/metrics", server.addr()))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("hct_update_runs_total"));
        assert!(body.contains("no_update"));
        server.shutdown().await.unwrap();
    }
}
