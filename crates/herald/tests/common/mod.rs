#![allow(dead_code)]

use futures_util::StreamExt;
use herald::config::ServerConfig;
use herald::origin::AllowList;
use herald::server::ServerState;
use herald_common::Message;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub fn test_config(listen: SocketAddr) -> ServerConfig {
    ServerConfig {
        listen,
        metrics_addr: "127.0.0.1:0".parse().unwrap(),
        ws_path: "/ws".to_string(),
        public_scheme: "http".to_string(),
        allowed_origins: AllowList::default(),
        allowed_hosts: AllowList::default(),
        replay_last: true,
        max_conns: 1000,
        max_message_size: 4096,
        handshake_timeout: 5,
        write_timeout: 2,
        ping_interval: 30,
        idle_timeout: 120,
        shutdown_timeout: 2,
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TestServer {
    pub fn url(&self) -> String {
        format!("ws://{}{}", self.addr, self.state.config.ws_path)
    }

    pub fn same_origin(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn broadcast(&self, content: &str) {
        self.state.hub.broadcast(Message::new(content)).await;
    }

    /// Wait until the hub holds exactly `n` subscribers.
    pub async fn wait_for_subscribers(&self, n: usize) {
        let hub = Arc::clone(&self.state.hub);
        tokio::time::timeout(Duration::from_secs(5), async move {
            while hub.len() != n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timeout waiting for {n} subscribers"));
    }

    /// Trigger shutdown and wait for the accept loop to return.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(Duration::from_secs(10), &mut self.task)
            .await
            .expect("server did not shut down")
            .unwrap();
    }
}

pub async fn start_server(configure: impl FnOnce(&mut ServerConfig)) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut config = test_config(addr);
    configure(&mut config);
    let state = Arc::new(ServerState::new(config));

    let (tx, rx) = oneshot::channel::<()>();
    let state_clone = state.clone();
    let task = tokio::spawn(async move {
        let shutdown = async {
            let _ = rx.await;
        };
        if let Err(e) = herald::run_with_shutdown(listener, state_clone, shutdown).await {
            eprintln!("server error in test: {e}");
        }
    });

    TestServer {
        addr,
        state,
        shutdown: Some(tx),
        task,
    }
}

pub async fn start_default_server() -> TestServer {
    start_server(|_| {}).await
}

pub type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub async fn try_connect(url: &str, origin: Option<&str>) -> Result<ClientStream, tungstenite::Error> {
    let mut req = url.into_client_request().unwrap();
    if let Some(origin) = origin {
        req.headers_mut().insert("Origin", origin.parse().unwrap());
    }
    tokio_tungstenite::connect_async(req).await.map(|(ws, _)| ws)
}

/// Status of a refused upgrade, panicking if the upgrade succeeded.
pub async fn rejection_status(url: &str, origin: Option<&str>) -> StatusCode {
    match try_connect(url, origin).await {
        Err(tungstenite::Error::Http(resp)) => resp.status(),
        Err(other) => panic!("expected HTTP rejection, got {other:?}"),
        Ok(_) => panic!("expected HTTP rejection, upgrade succeeded"),
    }
}

pub struct TestClient {
    pub ws: ClientStream,
}

impl TestClient {
    pub async fn connect(server: &TestServer) -> Self {
        Self::connect_with_origin(server, Some(&server.same_origin())).await
    }

    pub async fn connect_with_origin(server: &TestServer, origin: Option<&str>) -> Self {
        let ws = try_connect(&server.url(), origin).await.unwrap();
        Self { ws }
    }

    /// Next broadcast message, skipping control frames.
    pub async fn recv(&mut self) -> Message {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), self.ws.next())
                .await
                .expect("timeout waiting for message")
                .expect("stream ended")
                .unwrap();
            match frame {
                WsMessage::Text(text) => return Message::decode(&text).unwrap(),
                WsMessage::Ping(_) | WsMessage::Pong(_) => {}
                other => panic!("expected text frame, got {other:?}"),
            }
        }
    }

    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Message> {
        tokio::time::timeout(timeout, self.recv()).await.ok()
    }

    /// Wait for the server to close the connection, returning the close frame if any.
    pub async fn expect_close(&mut self) -> Option<tungstenite::protocol::CloseFrame<'static>> {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), self.ws.next())
                .await
                .expect("timeout waiting for close");
            match frame {
                Some(Ok(WsMessage::Close(frame))) => return frame,
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {}
                Some(Ok(other)) => panic!("expected close, got {other:?}"),
                Some(Err(_)) | None => return None,
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
        while let Ok(Some(Ok(_))) =
            tokio::time::timeout(Duration::from_secs(1), self.ws.next()).await
        {}
    }
}
