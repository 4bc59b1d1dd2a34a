mod cli;
mod server;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::server::Server;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    if let Err(err) = run(cli).await {
        eprintln!("fleetform: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(cli: &Cli) {
    let filter = match (cli.debug, cli.verbose) {
        (true, _) | (_, 2) => "debug",
        (false, 0) => "warn",
        (false, 1) => "info",
        _ => "trace",
    };

    // Logs go to stderr; stdout is reserved for the handshake line.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", cli.port())).await?;
    let addr = listener.local_addr()?;

    // The host parses this exact line off stdout to find the transport.
    println!("{}", server::handshake_line(&addr));
    tracing::info!(%addr, debug = cli.debug, "provider listening");

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            signal_cancel.cancel();
        }
    });

    Server::new(cancel).run(listener).await
}
