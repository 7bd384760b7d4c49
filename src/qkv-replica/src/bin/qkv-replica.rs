//! Entry point for a single storage replica.
//!
//! Binds a `StorageService` to a TCP address and serves it over gRPC
//! until interrupted. One process is one replica; the replica set a
//! client treats as "a configuration" is just a list of these
//! addresses (see `qkv-client::config`).

use std::net::SocketAddr;
use std::process;

use anyhow::Context;
use tonic::transport::Server;
use tracing::info;

use qkv_proto::storage_server::StorageServer;
use qkv_store::StorageService;

/// Storage replica for the replicated key-value store.
#[derive(clap::Parser)]
#[clap(name = "qkv-replica")]
struct Args {
    /// The address on which to listen for client and peer connections.
    #[clap(
        long,
        env = "QKV_LISTEN_ADDR",
        value_name = "HOST:PORT",
        default_value = "127.0.0.1:7070"
    )]
    listen_addr: SocketAddr,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Args = clap::Parser::parse();
    if let Err(err) = run(args).await {
        eprintln!("qkv-replica: fatal: {:#}", err);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), anyhow::Error> {
    let service = StorageServer::new(StorageService::new());
    info!(addr = %args.listen_addr, "starting storage replica");

    Server::builder()
        .add_service(service)
        .serve_with_shutdown(args.listen_addr, shutdown_signal())
        .await
        .context("storage replica server error")?;

    info!("storage replica shut down");
    Ok(())
}

/// Resolves once SIGINT or (on unix) SIGTERM/SIGHUP is received, so the
/// server can stop accepting connections and drain gracefully instead
/// of being killed mid-request.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
            _ = sighup.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
