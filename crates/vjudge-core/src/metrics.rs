//! Prometheus metrics for the VJudge core.

use std::sync::LazyLock;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Terminal verdicts committed, by verdict string.
pub static VERDICT_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let opts = Opts::new("vjudge_verdict_total", "Total terminal verdicts committed, by verdict");
    IntCounterVec::new(opts, &["verdict"]).expect("failed to create counter")
});

/// Submissions successfully dispatched to an OJ.
pub static SUBMITS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("vjudge_submits_total", "Total submissions sent to an OJ")
        .expect("failed to create counter")
});

/// Submissions that ended in `Submit Failed`.
pub static SUBMIT_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("vjudge_submit_failures_total", "Total submissions that failed to submit")
        .expect("failed to create counter")
});

/// Currently in-flight status-poll tasks, across every StatusCrawler.
pub static ACTIVE_POLL_TASKS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("vjudge_active_poll_tasks", "Currently in-flight status poll tasks")
        .expect("failed to create gauge")
});

/// Currently running submitter groups (one per OJ with active traffic).
pub static ACTIVE_SUBMITTER_GROUPS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("vjudge_active_submitter_groups", "Currently running per-OJ submitter groups")
        .expect("failed to create gauge")
});

/// Registers every metric above with `REGISTRY`. Only safe to call once per
/// process; a second call panics, since re-registering the same metric name
/// with a `Registry` is a programming error, not a recoverable one.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(VERDICT_TOTAL.clone()))
        .expect("failed to register metric");
    REGISTRY
        .register(Box::new(SUBMITS_TOTAL.clone()))
        .expect("failed to register metric");
    REGISTRY
        .register(Box::new(SUBMIT_FAILURES_TOTAL.clone()))
        .expect("failed to register metric");
    REGISTRY
        .register(Box::new(ACTIVE_POLL_TASKS.clone()))
        .expect("failed to register metric");
    REGISTRY
        .register(Box::new(ACTIVE_SUBMITTER_GROUPS.clone()))
        .expect("failed to register metric");
}

pub fn record_verdict(verdict: &str) {
    VERDICT_TOTAL.with_label_values(&[verdict]).inc();
}

/// HTTP server exposing `/metrics` for Prometheus scraping.
pub struct MetricsServer;

impl MetricsServer {
    pub async fn run(port: u16) -> anyhow::Result<()> {
        use axum::{routing::get, Router};
        use std::net::SocketAddr;

        init_metrics();

        let app = Router::new()
            .route("/metrics", get(Self::metrics_handler))
            .route("/health", get(|| async { "OK" }));

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        tracing::info!(%addr, "metrics server listening");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    async fn metrics_handler() -> String {
        let encoder = TextEncoder::new();
        let metric_families = REGISTRY.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }
}
