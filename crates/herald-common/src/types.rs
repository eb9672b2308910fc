//! Protocol constants for the herald wire.

/// HTTP path that accepts WebSocket upgrade requests.
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Upper bound for a single inbound frame from a subscriber.
///
/// Subscribers never send application data, so anything beyond a small
/// control payload is treated as abuse.
pub const DEFAULT_MAX_INBOUND: usize = 4096;
