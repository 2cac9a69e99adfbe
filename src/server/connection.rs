//! Connection handling for [`DrugServer`](super::DrugServer).

use std::{io, net::SocketAddr};

use futures::FutureExt;
use log::{error, warn};
use tokio::{net::TcpStream, time::timeout};
use tokio_rustls::TlsAcceptor;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::debug;

use crate::{
    dispatch::Dispatcher,
    session::{Session, SessionConfig, SessionError},
};

/// Everything a connection task needs, cloned once per accepted socket.
#[derive(Clone)]
pub(in crate::server) struct ConnectionContext {
    pub dispatcher: Dispatcher,
    pub session: SessionConfig,
    pub tls: Option<TlsAcceptor>,
    pub shutdown: CancellationToken,
}

/// Spawn a task to process a single TCP connection, logging and discarding any panics.
pub(in crate::server) fn spawn_connection_task(
    stream: TcpStream,
    context: ConnectionContext,
    tracker: &TaskTracker,
) {
    let peer_addr = match stream.peer_addr() {
        Ok(addr) => Some(addr),
        Err(e) => {
            warn!("Failed to retrieve peer address: error={e}");
            None
        }
    };
    tracker.spawn(async move {
        #[cfg(feature = "metrics")]
        crate::metrics::inc_connections();
        let result = std::panic::AssertUnwindSafe(process_stream(stream, peer_addr, context))
            .catch_unwind()
            .await;
        #[cfg(feature = "metrics")]
        crate::metrics::dec_connections();

        if let Err(panic) = result {
            #[cfg(feature = "metrics")]
            crate::metrics::inc_connection_panics();
            let panic_msg = crate::panic::format_panic(&panic);
            // Emit via both `log` and `tracing` for tests that capture either.
            error!("connection task panicked: panic={panic_msg}, peer_addr={peer_addr:?}");
            tracing::error!(panic = %panic_msg, ?peer_addr, "connection task panicked");
        }
    });
}

async fn process_stream(
    stream: TcpStream,
    peer_addr: Option<SocketAddr>,
    context: ConnectionContext,
) {
    let ConnectionContext {
        dispatcher,
        session: config,
        tls,
        shutdown,
    } = context;
    let mut session = Session::new(peer_addr, dispatcher, config, shutdown);

    let outcome = match tls {
        Some(acceptor) => match accept_tls(&acceptor, stream, &config).await {
            Ok(stream) => session.run(stream).await,
            Err(e) => {
                warn!("tls handshake failed: error={e}, peer_addr={peer_addr:?}");
                #[cfg(feature = "metrics")]
                crate::metrics::inc_handshake_failures();
                return;
            }
        },
        None => session.run(stream).await,
    };

    match outcome {
        Ok(reason) => debug!(id = %session.id(), ?peer_addr, ?reason, "connection closed"),
        Err(SessionError::Handshake(e)) => {
            warn!("upgrade rejected: error={e}, peer_addr={peer_addr:?}");
        }
        Err(e) => warn!("connection failed: error={e}, peer_addr={peer_addr:?}"),
    }
}

async fn accept_tls(
    acceptor: &TlsAcceptor,
    stream: TcpStream,
    config: &SessionConfig,
) -> io::Result<tokio_rustls::server::TlsStream<TcpStream>> {
    let accept = acceptor.accept(stream);
    match config.handshake_timeout {
        Some(limit) => timeout(limit, accept).await.unwrap_or_else(|_| {
            Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "tls handshake timed out",
            ))
        }),
        None => accept.await,
    }
}
