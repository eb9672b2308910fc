use crate::config::ServerConfig;
use crate::error::HeraldError;
use crate::hub::Hub;
use crate::observer::{DisconnectReason, WritePhase};
use crate::origin::{self, AllowList};
use crate::registry::{write_message, ConnId, Connection};
use crate::server::ServerState;
use futures_util::{Stream, StreamExt};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::net::TcpStream;
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header, StatusCode};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;

/// Reason an upgrade request was refused before the WebSocket handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Request path is not the upgrade endpoint.
    NotFound,
    /// `Host` header not in the host allow-list.
    HostNotAllowed,
    /// `Origin` header failed origin validation.
    OriginNotAllowed,
}

impl Rejection {
    /// HTTP status returned to the client.
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::HostNotAllowed | Self::OriginNotAllowed => StatusCode::FORBIDDEN,
        }
    }

    /// Stable label for logs and metrics.
    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::HostNotAllowed => "host_not_allowed",
            Self::OriginNotAllowed => "origin_not_allowed",
        }
    }

    fn into_response(self) -> ErrorResponse {
        let body = match self {
            Self::NotFound => "Not found",
            Self::HostNotAllowed => "Host not allowed",
            Self::OriginNotAllowed => "Origin not allowed",
        };
        let mut resp = ErrorResponse::new(Some(body.to_string()));
        *resp.status_mut() = self.status();
        resp
    }
}

/// Admission checks run on the raw upgrade request.
#[derive(Debug, Clone)]
pub struct HandshakeGate {
    ws_path: String,
    public_scheme: String,
    allowed_origins: AllowList,
    allowed_hosts: AllowList,
}

impl HandshakeGate {
    /// Build the gate from server configuration.
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            ws_path: config.ws_path.clone(),
            public_scheme: config.public_scheme.clone(),
            allowed_origins: config.allowed_origins.clone(),
            allowed_hosts: config.allowed_hosts.clone(),
        }
    }

    /// Check path, then host, then origin.
    ///
    /// A header that is present but not readable text is rejected rather
    /// than treated as missing.
    ///
    /// # Errors
    ///
    /// Returns the first [`Rejection`] that applies.
    pub fn check(&self, req: &Request) -> Result<(), Rejection> {
        if req.uri().path() != self.ws_path {
            return Err(Rejection::NotFound);
        }

        let host = header_str(req, header::HOST).ok_or(Rejection::HostNotAllowed)?;
        if !origin::is_host_allowed(host, &self.allowed_hosts) {
            return Err(Rejection::HostNotAllowed);
        }

        let declared = header_str(req, header::ORIGIN).ok_or(Rejection::OriginNotAllowed)?;
        if !origin::is_allowed(declared, &self.allowed_origins, &self.public_scheme, host) {
            return Err(Rejection::OriginNotAllowed);
        }
        Ok(())
    }
}

/// Trimmed header text, `Some("")` when absent, `None` when the value is
/// not visible ASCII.
fn header_str(req: &Request, name: header::HeaderName) -> Option<&str> {
    match req.headers().get(name) {
        None => Some(""),
        Some(value) => value.to_str().ok().map(str::trim),
    }
}

/// Keeps a connection registered for as long as it lives.
///
/// Dropping it removes the connection from the hub and reports the
/// disconnect, whichever way the task exits.
struct Registration {
    hub: Arc<Hub>,
    id: ConnId,
    peer: SocketAddr,
    reason: DisconnectReason,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.hub.unregister(self.id) {
            self.hub
                .observer()
                .disconnected(self.id, self.peer, &self.reason);
        }
    }
}

/// Run one subscriber from TCP accept to deregistration.
///
/// # Errors
///
/// Returns an error if the upgrade is rejected or fails. Disconnects after
/// registration are the normal path and return `Ok`.
pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), HeraldError> {
    let hub = Arc::clone(&state.hub);
    let config = &state.config;

    let ws_config = WebSocketConfig {
        max_message_size: Some(config.max_message_size),
        max_frame_size: Some(config.max_message_size),
        ..WebSocketConfig::default()
    };

    let gate = HandshakeGate::from_config(config);
    let rejected: Arc<OnceLock<Rejection>> = Arc::new(OnceLock::new());
    let rejected_cell = Arc::clone(&rejected);

    let upgrade = tokio_tungstenite::accept_hdr_async_with_config(
        stream,
        move |req: &Request, resp: Response| match gate.check(req) {
            Ok(()) => Ok(resp),
            Err(rejection) => {
                let _ = rejected_cell.set(rejection);
                Err(rejection.into_response())
            }
        },
        Some(ws_config),
    );

    let ws_stream = match timeout(config.handshake_timeout(), upgrade).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            if let Some(rejection) = rejected.get() {
                hub.observer().handshake_rejected(peer_addr, rejection.reason());
                return Err(HeraldError::HandshakeRejected(rejection.reason()));
            }
            let err = HeraldError::WebSocket(e);
            hub.observer().upgrade_failed(peer_addr, &err);
            return Err(err);
        }
        Err(_) => {
            let err = HeraldError::HandshakeTimeout;
            hub.observer().upgrade_failed(peer_addr, &err);
            return Err(err);
        }
    };

    let (ws_tx, mut ws_rx) = ws_stream.split();
    let conn = Arc::new(Connection::new(peer_addr, ws_tx));

    let mut registration = admit(&conn, &hub).await;
    registration.reason = drain(&conn, &mut ws_rx, &hub, config).await;
    drop(registration);
    conn.close(hub.write_timeout()).await;
    Ok(())
}

/// Register `conn` and write its replay message, if any.
///
/// The write lock is held across registration and replay so a broadcast that
/// already sees this connection can only write after the replay. A failed
/// replay is reported and the connection stays registered.
async fn admit(conn: &Arc<Connection>, hub: &Arc<Hub>) -> Registration {
    let mut sink = conn.lock_sink().await;
    let replay = hub.register(Arc::clone(conn));
    let registration = Registration {
        hub: Arc::clone(hub),
        id: conn.id(),
        peer: conn.peer(),
        reason: DisconnectReason::Aborted,
    };
    hub.observer().connected(conn.id(), conn.peer());

    if let Some(msg) = replay {
        if let Err(e) = write_message(&mut sink, &msg, hub.write_timeout()).await {
            hub.observer()
                .write_failed(conn.id(), conn.peer(), WritePhase::Replay, &e);
        }
    }
    registration
}

/// Read until the peer goes away. Inbound data frames are discarded; the
/// loop exists only to notice close, errors and silence.
async fn drain<S>(
    conn: &Connection,
    ws_rx: &mut S,
    hub: &Hub,
    config: &ServerConfig,
) -> DisconnectReason
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let period = config.ping_interval();
    let mut ping_interval = interval_at(Instant::now() + period, period);
    let idle_timeout = config.idle_timeout();
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Close(_))) | None => return DisconnectReason::Closed,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return DisconnectReason::ReadError(e.to_string()),
                }
            }
            _ = ping_interval.tick() => {
                if last_activity.elapsed() >= idle_timeout {
                    tracing::debug!(conn_id = conn.id(), "idle timeout reached");
                    return DisconnectReason::IdleTimeout;
                }
                if let Err(e) = conn.send(Message::Ping(Vec::new()), hub.write_timeout()).await {
                    hub.observer().write_failed(conn.id(), conn.peer(), WritePhase::Ping, &e);
                }
            }
        }
    }
}
