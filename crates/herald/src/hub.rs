//! Connection hub: registry, last-message cache and broadcast fan-out.

use crate::observer::{HubObserver, TracingObserver, WritePhase};
use crate::registry::{ConnId, Connection, ConnectionRegistry, LastMessage};
use futures_util::future::join_all;
use herald_common::Message;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use tracing::warn;
use tungstenite::Message as WsMessage;

#[derive(Debug, Default)]
struct Shared {
    registry: ConnectionRegistry,
    last: LastMessage,
}

/// The single shared hub.
///
/// Registry and cache sit behind one reader/writer lock. The lock is never
/// held across socket I/O: broadcasts copy the member list and write after
/// releasing it.
pub struct Hub {
    shared: RwLock<Shared>,
    replay_last: bool,
    write_timeout: Duration,
    observer: Arc<dyn HubObserver>,
}

impl Hub {
    /// Create a hub that reports through [`TracingObserver`].
    #[must_use]
    pub fn new(replay_last: bool, write_timeout: Duration) -> Self {
        Self::with_observer(replay_last, write_timeout, Arc::new(TracingObserver))
    }

    /// Create a hub with a custom observer.
    #[must_use]
    pub fn with_observer(
        replay_last: bool,
        write_timeout: Duration,
        observer: Arc<dyn HubObserver>,
    ) -> Self {
        Self {
            shared: RwLock::new(Shared::default()),
            replay_last,
            write_timeout,
            observer,
        }
    }

    /// Whether joiners receive the last broadcast.
    #[must_use]
    pub fn replay_enabled(&self) -> bool {
        self.replay_last
    }

    /// Per-connection write deadline.
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Observer shared with the connection lifecycle.
    #[must_use]
    pub fn observer(&self) -> &Arc<dyn HubObserver> {
        &self.observer
    }

    /// Add a connection without reading the cache.
    #[cfg(test)]
    pub(crate) fn add(&self, conn: Arc<Connection>) -> bool {
        self.shared.write().registry.add(conn)
    }

    /// Add a connection and, in the same critical section, read the message
    /// it should be replayed.
    ///
    /// Any broadcast that runs before this call updates the cache first, so
    /// the value returned here is never older than a broadcast the new
    /// connection missed.
    pub fn register(&self, conn: Arc<Connection>) -> Option<Message> {
        let mut shared = self.shared.write();
        shared.registry.add(conn);
        if self.replay_last {
            shared.last.get()
        } else {
            None
        }
    }

    /// Remove a connection. Returns `false` if it was not registered.
    pub fn unregister(&self, id: ConnId) -> bool {
        self.shared.write().registry.remove(id)
    }

    /// Copy of the current members.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.shared.read().registry.snapshot()
    }

    /// Returns `true` if the connection is registered.
    #[must_use]
    pub fn contains(&self, id: ConnId) -> bool {
        self.shared.read().registry.contains(id)
    }

    /// Cached message, or `None` when nothing was broadcast yet or replay
    /// is disabled.
    #[must_use]
    pub fn last_message(&self) -> Option<Message> {
        self.shared.read().last.get()
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.read().registry.len()
    }

    /// Returns `true` if no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.read().registry.is_empty()
    }

    /// Deliver `msg` to every registered connection.
    ///
    /// The cache update and the snapshot happen under one exclusive lock.
    /// Writes then go out one connection at a time; a failed or timed-out
    /// write is reported to the observer and the loop moves on.
    pub async fn broadcast(&self, msg: Message) {
        let started = Instant::now();
        let text = match msg.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "failed to encode broadcast");
                return;
            }
        };

        let targets = {
            let mut shared = self.shared.write();
            if self.replay_last {
                shared.last.set(msg);
            }
            shared.registry.snapshot()
        };

        let mut failures = 0usize;
        for conn in &targets {
            if let Err(e) = conn
                .send(WsMessage::Text(text.clone()), self.write_timeout)
                .await
            {
                failures += 1;
                self.observer
                    .write_failed(conn.id(), conn.peer(), WritePhase::Broadcast, &e);
            }
        }

        self.observer
            .broadcast_completed(targets.len(), failures, started.elapsed());
    }

    /// Send a close frame to every registered connection.
    ///
    /// Closes run concurrently, so the whole call is bounded by one
    /// `write_timeout` however many subscribers are stalled. Used on shutdown
    /// so subscribers' read loops end on their own.
    pub async fn close_all(&self) {
        let targets = self.snapshot();
        join_all(targets.iter().map(|conn| conn.close(self.write_timeout))).await;
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("connections", &self.len())
            .field("replay_last", &self.replay_last)
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}
