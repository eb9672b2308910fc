use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors raised while subscribing to a broadcaster.
#[derive(Debug, Error)]
pub enum ListenError {
    /// The broadcaster URL could not be turned into a WebSocket request.
    #[error("invalid broadcaster url: {0}")]
    InvalidUrl(String),

    /// The `--origin` value is not a valid header value.
    #[error("invalid origin header: {0}")]
    InvalidOrigin(String),

    /// The server answered the upgrade with a non-101 status.
    #[error("upgrade rejected with HTTP {0}")]
    Rejected(u16),

    /// Transport or protocol failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Writing to the output failed.
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

impl ListenError {
    /// Errors that no amount of reconnecting will fix.
    ///
    /// A 403 means the origin or host is not on the server's allow-list and a
    /// 404 means the path is wrong; both need a config change.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::InvalidUrl(_) | Self::InvalidOrigin(_) | Self::Io(_) => true,
            Self::Rejected(status) => *status >= 400 && *status < 500,
            Self::WebSocket(_) => false,
        }
    }
}
