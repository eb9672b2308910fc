use thiserror::Error;

/// Errors that can occur while serving subscribers.
#[derive(Error, Debug)]
pub enum HeraldError {
    /// The upgrade request was refused before the WebSocket handshake completed.
    #[error("handshake rejected: {0}")]
    HandshakeRejected(&'static str),
    /// The client did not complete the upgrade in time.
    #[error("handshake timed out")]
    HandshakeTimeout,
    /// WebSocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A write to a subscriber did not finish within the configured timeout.
    #[error("write timed out")]
    WriteTimeout,
    /// Wire encoding error.
    #[error("message error: {0}")]
    Message(#[from] herald_common::MessageError),
}
