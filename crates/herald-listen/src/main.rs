#![forbid(unsafe_code)]

use clap::Parser;
use herald_listen::config::ListenArgs;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let directive = match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        EnvFilter::new(directive)
    };
    // stdout carries the messages themselves.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ListenArgs::parse();
    init_tracing(args.verbose);

    if let Err(e) = args.validate() {
        anyhow::bail!("configuration error: {}", e);
    }

    let mut stdout = tokio::io::stdout();
    tokio::select! {
        result = herald_listen::run(&args, &mut stdout) => result?,
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }
    Ok(())
}
