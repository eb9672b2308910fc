use crate::error::HeraldError;
use crate::metrics::{counters, gauges, histograms};
use crate::registry::ConnId;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which write path failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    /// Fan-out of a live broadcast.
    Broadcast,
    /// Join-time replay of the cached message.
    Replay,
    /// Keepalive ping from the read loop.
    Ping,
}

impl WritePhase {
    /// Stable label for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Broadcast => "broadcast",
            Self::Replay => "replay",
            Self::Ping => "ping",
        }
    }
}

/// Why a connection left the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Peer sent a close frame or the stream ended.
    Closed,
    /// No inbound traffic within the idle timeout.
    IdleTimeout,
    /// The read side failed.
    ReadError(String),
    /// The task ended without reaching the read loop's exit (error or
    /// cancellation).
    Aborted,
}

impl DisconnectReason {
    /// Stable label for metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::IdleTimeout => "idle_timeout",
            Self::ReadError(_) => "read_error",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadError(e) => write!(f, "read error: {e}"),
            other => f.write_str(other.label()),
        }
    }
}

/// Extension points invoked by the hub and the connection lifecycle.
///
/// Every method has an empty default so implementors only override what
/// they care about.
pub trait HubObserver: Send + Sync {
    /// A subscriber passed the handshake and was registered.
    fn connected(&self, _id: ConnId, _peer: SocketAddr) {}

    /// A subscriber was removed from the registry.
    fn disconnected(&self, _id: ConnId, _peer: SocketAddr, _reason: &DisconnectReason) {}

    /// An upgrade request was refused by the path, host or origin gate.
    fn handshake_rejected(&self, _peer: SocketAddr, _reason: &'static str) {}

    /// The WebSocket upgrade itself failed.
    fn upgrade_failed(&self, _peer: SocketAddr, _error: &HeraldError) {}

    /// A write to one subscriber failed; delivery to others continues.
    fn write_failed(
        &self,
        _id: ConnId,
        _peer: SocketAddr,
        _phase: WritePhase,
        _error: &HeraldError,
    ) {
    }

    /// A broadcast finished its fan-out.
    fn broadcast_completed(&self, _recipients: usize, _failures: usize, _elapsed: Duration) {}
}

/// Default observer: structured `tracing` logs plus Prometheus metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl HubObserver for TracingObserver {
    fn connected(&self, id: ConnId, peer: SocketAddr) {
        gauges::inc_connections_active();
        counters::handshakes_total("accepted");
        info!(conn_id = id, %peer, "client connected");
    }

    fn disconnected(&self, id: ConnId, peer: SocketAddr, reason: &DisconnectReason) {
        gauges::dec_connections_active();
        counters::disconnections_total(reason.label());
        info!(conn_id = id, %peer, %reason, "client disconnected");
    }

    fn handshake_rejected(&self, peer: SocketAddr, reason: &'static str) {
        counters::handshakes_total(reason);
        warn!(%peer, reason, "upgrade rejected");
    }

    fn upgrade_failed(&self, peer: SocketAddr, error: &HeraldError) {
        counters::handshakes_total("failed");
        warn!(%peer, %error, "websocket upgrade failed");
    }

    fn write_failed(&self, id: ConnId, peer: SocketAddr, phase: WritePhase, error: &HeraldError) {
        counters::write_failures_total(phase.as_str());
        warn!(conn_id = id, %peer, phase = phase.as_str(), %error, "write failed");
    }

    fn broadcast_completed(&self, recipients: usize, failures: usize, elapsed: Duration) {
        counters::broadcasts_total();
        counters::messages_delivered_total(recipients.saturating_sub(failures) as u64);
        histograms::broadcast_seconds(elapsed.as_secs_f64());
        debug!(recipients, failures, elapsed_ms = elapsed.as_millis() as u64, "broadcast done");
    }
}
