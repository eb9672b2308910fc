use crate::error::HeraldError;
use futures_util::{Sink, SinkExt};
use herald_common::Message;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{timeout, Duration};
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::CloseFrame;
use tungstenite::Message as WsMessage;

/// Process-unique connection identity.
pub type ConnId = u64;

/// Type-erased write half of a subscriber socket.
pub type BoxSink = Pin<Box<dyn Sink<WsMessage, Error = tungstenite::Error> + Send>>;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to one subscriber's WebSocket.
///
/// The write half sits behind an async mutex so a broadcast, a replay and a
/// keepalive ping can never interleave frames on the same socket.
pub struct Connection {
    id: ConnId,
    peer: SocketAddr,
    sink: Mutex<BoxSink>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap a sink, assigning a fresh [`ConnId`].
    pub fn new<S>(peer: SocketAddr, sink: S) -> Self
    where
        S: Sink<WsMessage, Error = tungstenite::Error> + Send + 'static,
    {
        Self {
            id: NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed),
            peer,
            sink: Mutex::new(Box::pin(sink)),
        }
    }

    /// Identity key used by the registry.
    #[must_use]
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Remote address, for logging.
    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Take exclusive write access until the guard is dropped.
    pub async fn lock_sink(&self) -> MutexGuard<'_, BoxSink> {
        self.sink.lock().await
    }

    /// Write one frame, bounded by `limit` (including the wait for the lock).
    ///
    /// # Errors
    ///
    /// Returns [`HeraldError::WriteTimeout`] if the deadline passes, or the
    /// transport error if the socket rejects the frame.
    pub async fn send(&self, frame: WsMessage, limit: Duration) -> Result<(), HeraldError> {
        timeout(limit, async {
            let mut sink = self.sink.lock().await;
            sink.send(frame).await
        })
        .await
        .map_err(|_| HeraldError::WriteTimeout)?
        .map_err(HeraldError::WebSocket)
    }

    /// Send a normal close frame and shut the write half. Errors are ignored;
    /// the peer may already be gone.
    pub async fn close(&self, limit: Duration) {
        let frame = WsMessage::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        }));
        let _ = timeout(limit, async {
            let mut sink = self.sink.lock().await;
            let _ = sink.send(frame).await;
            let _ = sink.close().await;
        })
        .await;
    }
}

/// Encode `msg` and write it on an already-locked sink within `limit`.
///
/// # Errors
///
/// Returns an encoding, transport or timeout error.
pub async fn write_message(
    sink: &mut BoxSink,
    msg: &Message,
    limit: Duration,
) -> Result<(), HeraldError> {
    let text = msg.encode()?;
    timeout(limit, sink.send(WsMessage::Text(text)))
        .await
        .map_err(|_| HeraldError::WriteTimeout)?
        .map_err(HeraldError::WebSocket)
}

/// Set of connections currently eligible for broadcast.
///
/// Not synchronized on its own; the hub keeps it behind its lock together
/// with [`LastMessage`].
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    members: HashMap<ConnId, Arc<Connection>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle. Returns `false` if it was already present.
    pub fn add(&mut self, conn: Arc<Connection>) -> bool {
        match self.members.entry(conn.id()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(conn);
                true
            }
        }
    }

    /// Remove a handle by identity. Returns `false` if it was absent.
    pub fn remove(&mut self, id: ConnId) -> bool {
        self.members.remove(&id).is_some()
    }

    /// Copy all members into an independent list.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.members.values().cloned().collect()
    }

    /// Returns `true` if the handle is registered.
    #[must_use]
    pub fn contains(&self, id: ConnId) -> bool {
        self.members.contains_key(&id)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// The most recently broadcast message, if any.
#[derive(Debug, Default, Clone)]
pub struct LastMessage {
    message: Option<Message>,
}

impl LastMessage {
    /// Remember `msg` as the latest broadcast.
    pub fn set(&mut self, msg: Message) {
        self.message = Some(msg);
    }

    /// Current value, without clearing it.
    #[must_use]
    pub fn get(&self) -> Option<Message> {
        self.message.clone()
    }
}
