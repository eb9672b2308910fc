use crate::hub::Hub;
use axum::{http::StatusCode, response::Json, routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    connections: usize,
}

/// Readiness check response.
#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    ready: bool,
}

/// Shared readiness state. Flipped to not-ready when shutdown begins.
#[derive(Clone, Default)]
pub struct HealthState {
    ready: Arc<AtomicBool>,
}

impl HealthState {
    /// Create a new health state, initially ready.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Mark the service as ready or draining.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    /// Check if the service is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

/// Install the Prometheus recorder and serve `/metrics`, `/health` and
/// `/ready` on `addr`. `/health` reports the hub's subscriber count.
///
/// # Errors
///
/// Returns an error if the recorder is already installed or binding fails.
pub async fn start_metrics_server(
    addr: SocketAddr,
    health_state: HealthState,
    hub: Arc<Hub>,
) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let app = Router::new()
        .route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
        .route("/health", get(move || health_handler(Arc::clone(&hub))))
        .route("/ready", get(move || ready_handler(health_state.clone())));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler(hub: Arc<Hub>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            connections: hub.len(),
        }),
    )
}

async fn ready_handler(state: HealthState) -> (StatusCode, Json<ReadyResponse>) {
    if state.is_ready() {
        (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ready",
                ready: true,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                status: "draining",
                ready: false,
            }),
        )
    }
}

/// Connection count gauges.
pub mod gauges {
    /// Increment the registered-connections gauge.
    pub fn inc_connections_active() {
        metrics::gauge!("herald_connections_active").increment(1.0);
    }

    /// Decrement the registered-connections gauge.
    pub fn dec_connections_active() {
        metrics::gauge!("herald_connections_active").decrement(1.0);
    }
}

/// Event counters.
pub mod counters {
    /// Record a handshake outcome (`accepted`, `failed`, or a rejection reason).
    pub fn handshakes_total(outcome: &'static str) {
        metrics::counter!("herald_handshakes_total", "outcome" => outcome).increment(1);
    }

    /// Record a disconnection with its reason label.
    pub fn disconnections_total(reason: &'static str) {
        metrics::counter!("herald_disconnections_total", "reason" => reason).increment(1);
    }

    /// Increment the broadcasts counter.
    pub fn broadcasts_total() {
        metrics::counter!("herald_broadcasts_total").increment(1);
    }

    /// Count successful per-connection deliveries.
    pub fn messages_delivered_total(count: u64) {
        metrics::counter!("herald_messages_delivered_total").increment(count);
    }

    /// Record a failed write in the given phase.
    pub fn write_failures_total(phase: &'static str) {
        metrics::counter!("herald_write_failures_total", "phase" => phase).increment(1);
    }
}

/// Latency histograms.
pub mod histograms {
    /// Record the wall time of one broadcast fan-out, in seconds.
    pub fn broadcast_seconds(value: f64) {
        metrics::histogram!("herald_broadcast_seconds").record(value);
    }
}
