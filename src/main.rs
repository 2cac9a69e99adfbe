//! `drugwire` server binary.
//!
//! Loads configuration, opens the record store and serves until Ctrl+C.

use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use drugwire::{
    cache::LookupCache,
    cli::Cli,
    config::ServerConfig,
    dispatch::Dispatcher,
    server::{DrugServer, tls},
    store::SqliteStore,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "drugwire stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::resolve(&cli)?;

    if let Some(addr) = config.metrics_addr {
        #[cfg(feature = "metrics")]
        {
            drugwire::metrics::install_prometheus_exporter(addr)?;
            info!(%addr, "metrics exporter listening");
        }
        #[cfg(not(feature = "metrics"))]
        warn!(%addr, "metrics support not compiled in; ignoring metrics_addr");
    }

    let store = SqliteStore::open(&config.database)?;
    info!(database = %config.database.display(), "record store opened");
    let dispatcher = Dispatcher::new(Arc::new(store), Arc::new(LookupCache::new()));

    let mut server = DrugServer::new(dispatcher)
        .session_config(config.session_config())
        .accept_backoff(config.backoff())
        .shutdown_grace(config.shutdown_grace());
    match &config.tls {
        Some(files) => server = server.tls(tls::load_acceptor(&files.cert, &files.key)?),
        None => warn!("no TLS certificate configured; serving plaintext"),
    }

    server.bind(config.bind)?.run().await?;
    Ok(())
}
