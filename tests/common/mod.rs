//! Shared utilities for integration tests.
//!
//! Starts a server on an ephemeral port and hands back what a test needs
//! to talk to it and stop it.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use drugwire::{
    cache::LookupCache,
    dispatch::Dispatcher,
    server::{DrugServer, ServerError},
    store::{RecordStore, SqliteStore},
};
use drugwire_testing::{TestResult, unused_listener};
use tokio::{sync::oneshot, task::JoinHandle};
use tokio_rustls::TlsAcceptor;

/// A server running in a background task.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub cache: Arc<LookupCache>,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl RunningServer {
    /// Signal shutdown and wait for the server to return.
    pub async fn stop(mut self) -> TestResult {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(Duration::from_secs(10), self.handle).await???;
        Ok(())
    }
}

#[expect(
    clippy::expect_used,
    reason = "an in-memory store must open or the test cannot run"
)]
pub fn memory_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::in_memory().expect("in-memory store should open"))
}

/// Start a plaintext server backed by `store`.
pub async fn start(store: Arc<dyn RecordStore>) -> TestResult<RunningServer> {
    start_with(store, None).await
}

/// Start a server backed by `store`, terminating TLS when `tls` is set.
pub async fn start_with(
    store: Arc<dyn RecordStore>,
    tls: Option<TlsAcceptor>,
) -> TestResult<RunningServer> {
    let cache = Arc::new(LookupCache::new());
    let dispatcher = Dispatcher::new(store, Arc::clone(&cache));
    let (ready_tx, ready_rx) = oneshot::channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let mut server = DrugServer::new(dispatcher)
        .poll_interval(Duration::from_millis(5))
        .ready_signal(ready_tx);
    if let Some(acceptor) = tls {
        server = server.tls(acceptor);
    }
    let server = server.bind_existing_listener(unused_listener())?;
    let addr = server.local_addr().ok_or("server missing local addr")?;
    let handle = tokio::spawn(server.run_with_shutdown(async {
        let _ = stop_rx.await;
    }));
    ready_rx.await?;

    Ok(RunningServer {
        addr,
        cache,
        stop: Some(stop_tx),
        handle,
    })
}
