use herald::config::ServerConfig;
use herald::origin::AllowList;
use herald::server::ServerState;
use herald_common::Message;
use herald_listen::config::ListenArgs;
use herald_listen::ListenError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

fn server_config(listen: SocketAddr) -> ServerConfig {
    ServerConfig {
        listen,
        metrics_addr: "127.0.0.1:0".parse().unwrap(),
        ws_path: "/ws".to_string(),
        public_scheme: "http".to_string(),
        allowed_origins: AllowList::default(),
        allowed_hosts: AllowList::default(),
        replay_last: true,
        max_conns: 100,
        max_message_size: 4096,
        handshake_timeout: 5,
        write_timeout: 2,
        ping_interval: 30,
        idle_timeout: 120,
        shutdown_timeout: 2,
    }
}

async fn start_server() -> (
    SocketAddr,
    Arc<ServerState>,
    oneshot::Sender<()>,
    JoinHandle<()>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(ServerState::new(server_config(addr)));
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
    (addr, state, tx, task)
}

fn listen_args(addr: SocketAddr, origin: Option<&str>, once: bool) -> ListenArgs {
    ListenArgs {
        url: format!("ws://{addr}/ws"),
        origin: origin.map(str::to_string),
        reconnect_initial_ms: 50,
        reconnect_max_ms: 200,
        reconnect_factor: 2.0,
        once,
        verbose: 0,
    }
}

async fn wait_for_subscribers(state: &ServerState, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.hub.len() != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timeout waiting for subscribers");
}

#[tokio::test]
async fn prints_replay_then_live_messages_until_server_closes() {
    let (addr, state, shutdown, server) = start_server().await;
    state.hub.broadcast(Message::new("cached")).await;

    let args = listen_args(addr, None, true);
    let listener = tokio::spawn(async move {
        let mut out = Vec::new();
        let result = herald_listen::run(&args, &mut out).await;
        (result, out)
    });

    wait_for_subscribers(&state, 1).await;
    state.hub.broadcast(Message::new("live one")).await;
    state.hub.broadcast(Message::new("live two")).await;

    let _ = shutdown.send(());
    server.await.unwrap();

    let (result, out) = tokio::time::timeout(Duration::from_secs(5), listener)
        .await
        .expect("listener did not exit")
        .unwrap();
    assert!(result.is_ok(), "{result:?}");
    assert_eq!(String::from_utf8(out).unwrap(), "cached\nlive one\nlive two\n");
}

#[tokio::test]
async fn forbidden_origin_stops_without_retrying() {
    let (addr, state, _shutdown, _server) = start_server().await;

    let args = listen_args(addr, Some("http://elsewhere.example"), false);
    let mut out = Vec::new();
    let result = tokio::time::timeout(Duration::from_secs(5), herald_listen::run(&args, &mut out))
        .await
        .expect("fatal rejection should not be retried");

    assert!(matches!(result, Err(ListenError::Rejected(403))));
    assert!(state.hub.is_empty());
}

#[tokio::test]
async fn unreachable_server_fails_in_once_mode() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let args = listen_args(addr, None, true);
    let mut out = Vec::new();
    let err = herald_listen::run(&args, &mut out).await.unwrap_err();
    assert!(!err.is_fatal());
    assert!(out.is_empty());
}

#[tokio::test]
async fn reconnects_after_connection_loss() {
    let (addr, state, _shutdown, _server) = start_server().await;

    let args = listen_args(addr, None, false);
    let listener = tokio::spawn(async move {
        let mut out = Vec::new();
        let _ = herald_listen::run(&args, &mut out).await;
    });

    wait_for_subscribers(&state, 1).await;
    state.hub.close_all().await;
    wait_for_subscribers(&state, 0).await;

    // The backoff timer brings the subscriber back.
    wait_for_subscribers(&state, 1).await;
    listener.abort();
}
