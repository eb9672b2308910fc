#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use herald::config::{Args, ServerConfig};
use herald::metrics::{start_metrics_server, HealthState};
use herald::producer::pump_lines;
use herald::server::ServerState;
use herald::run_with_shutdown;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let directive = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::new(directive)
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    let read_stdin = !args.no_stdin;
    let config: ServerConfig = args.into();

    if let Err(e) = config.validate() {
        anyhow::bail!("configuration error: {}", e);
    }

    if config.allowed_origins.is_empty() {
        info!("no allowed origins configured, accepting same-origin upgrades only");
    }
    info!(replay_last = config.replay_last, "hub configured");

    let state = Arc::new(ServerState::new(config.clone()));

    let listener = TcpListener::bind(config.listen).await?;
    info!("bound to {}", config.listen);
    info!(
        "websocket endpoint at {}://{}{}",
        if config.public_scheme == "https" { "wss" } else { "ws" },
        config.listen,
        config.ws_path
    );

    let health_state = HealthState::new();

    tokio::spawn({
        let health_state = health_state.clone();
        let hub = Arc::clone(&state.hub);
        let metrics_addr = config.metrics_addr;
        async move {
            if let Err(e) = start_metrics_server(metrics_addr, health_state, hub).await {
                warn!("metrics server error: {}", e);
            }
        }
    });

    if read_stdin {
        let hub = Arc::clone(&state.hub);
        tokio::spawn(async move {
            info!("type a message and press enter to broadcast it");
            match pump_lines(BufReader::new(tokio::io::stdin()), &hub).await {
                Ok(sent) => info!(sent, "stdin closed, no more broadcasts"),
                Err(e) => error!("failed to read stdin: {}", e),
            }
        });
    }

    let shutdown = {
        let health_state = health_state.clone();
        async move {
            shutdown_signal().await;
            health_state.set_ready(false);
        }
    };

    if let Err(e) = run_with_shutdown(listener, state, shutdown).await {
        error!("server error: {}", e);
    }

    Ok(())
}
