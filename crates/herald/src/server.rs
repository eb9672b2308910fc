use crate::config::ServerConfig;
use crate::connection::handle_connection;
use crate::error::HeraldError;
use crate::hub::Hub;
use crate::observer::HubObserver;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Shared state for the broadcaster.
#[derive(Debug)]
pub struct ServerState {
    /// Connection hub shared with the producer.
    pub hub: Arc<Hub>,
    /// Runtime server configuration.
    pub config: ServerConfig,
    /// One permit per open socket, from accept until its task ends.
    pub conn_slots: Arc<Semaphore>,
}

impl ServerState {
    /// Build state with a hub configured from `config`.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let hub = Hub::new(config.replay_last, config.write_timeout());
        Self::with_hub(config, hub)
    }

    /// Build state with a custom hub observer.
    #[must_use]
    pub fn with_observer(config: ServerConfig, observer: Arc<dyn HubObserver>) -> Self {
        let hub = Hub::with_observer(config.replay_last, config.write_timeout(), observer);
        Self::with_hub(config, hub)
    }

    fn with_hub(config: ServerConfig, hub: Hub) -> Self {
        Self {
            hub: Arc::new(hub),
            conn_slots: Arc::new(Semaphore::new(config.max_conns)),
            config,
        }
    }
}

/// Run the accept loop until the process exits.
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn run(listener: TcpListener, state: Arc<ServerState>) -> Result<(), HeraldError> {
    run_with_shutdown(listener, state, std::future::pending()).await
}

/// Run the accept loop until `shutdown` resolves.
///
/// Every accepted socket, including ones still in the upgrade handshake,
/// holds one of `max_conns` slots until its task ends; sockets beyond that
/// are dropped on accept.
///
/// On shutdown the listener stops accepting. Close frames to every
/// subscriber and the wait for in-flight tasks share one `shutdown_timeout`
/// window, after which the remaining tasks are aborted.
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn run_with_shutdown<F>(
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown: F,
) -> Result<(), HeraldError>
where
    F: Future<Output = ()> + Send,
{
    let local_addr = listener.local_addr().map_err(HeraldError::Io)?;
    info!("server listening on {}", local_addr);
    let mut tasks: JoinSet<()> = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        let Ok(permit) = Arc::clone(&state.conn_slots).try_acquire_owned() else {
                            warn!("max connections reached, rejecting {}", addr);
                            drop(stream);
                            continue;
                        };
                        let state = Arc::clone(&state);
                        let _ = tasks.spawn(async move {
                            let _permit = permit;
                            if let Err(e) = handle_connection(stream, addr, state).await {
                                tracing::debug!("connection from {} ended: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("failed to accept connection: {}", e);
                    }
                }
            }
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            () = &mut shutdown => {
                info!("shutdown signal received, draining {} connections", tasks.len());
                break;
            }
        }
    }

    drop(listener);

    let drained = tokio::time::timeout(state.config.shutdown_timeout(), async {
        state.hub.close_all().await;
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            "drain timeout reached with {} connections still active",
            tasks.len()
        );
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }

    info!("server shut down gracefully");
    Ok(())
}
