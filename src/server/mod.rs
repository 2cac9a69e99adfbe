//! Tokio-based server for drug-record sessions.
//!
//! `DrugServer` runs a single accept loop. Each accepted socket is handed to
//! its own task, which optionally terminates TLS and then drives a
//! [`Session`](crate::session::Session) until the client leaves or the
//! server shuts down.

use std::{sync::Arc, time::Duration};

use tokio::{net::TcpListener, sync::oneshot};
use tokio_rustls::TlsAcceptor;

use crate::{dispatch::Dispatcher, session::SessionConfig};

/// Default time allowed for open sessions to finish after shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Tokio-based server sharing one [`Dispatcher`] across connections.
///
/// The server carries a typestate `S` indicating whether it is
/// [`Unbound`] (not yet bound to a TCP listener) or [`Bound`]. New
/// servers start `Unbound` and must call [`DrugServer::bind`] or
/// [`DrugServer::bind_existing_listener`] before running.
pub struct DrugServer<S = Unbound>
where
    S: ServerState,
{
    pub(crate) dispatcher: Dispatcher,
    pub(crate) session: SessionConfig,
    pub(crate) tls: Option<TlsAcceptor>,
    /// Channel used to notify when the server is ready.
    ///
    /// A `oneshot::Sender` can transmit only one readiness notification, so a
    /// new sender must be provided each time the server is started.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    pub(crate) backoff_config: BackoffConfig,
    pub(crate) shutdown_grace: Duration,
    /// Typestate tracking whether the server has been bound to a listener.
    pub(crate) state: S,
}

/// Marker indicating the server has not yet bound a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server is bound to a TCP listener.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) listener: Arc<TcpListener>,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {}

mod sealed {
    //! Prevent external implementations of [`ServerState`].

    pub trait Sealed {}
    impl Sealed for super::Unbound {}
    impl Sealed for super::Bound {}
}

impl ServerState for Unbound {}
impl ServerState for Bound {}

mod config;
mod connection;
pub mod error;
mod runtime;
pub mod tls;

pub use error::ServerError;
/// Re-exported configuration types for server backoff behavior.
pub use runtime::BackoffConfig;

#[cfg(test)]
pub(crate) mod test_util;
