//! Configuration utilities for [`DrugServer`].

use std::time::Duration;

use tokio::sync::oneshot;
use tokio_rustls::TlsAcceptor;

use super::{BackoffConfig, DEFAULT_SHUTDOWN_GRACE, DrugServer, ServerState, Unbound};
use crate::{dispatch::Dispatcher, session::SessionConfig};

mod binding;
#[cfg(test)]
mod tests;

impl DrugServer<Unbound> {
    /// Create a new `DrugServer` serving requests through `dispatcher`.
    ///
    /// Sessions use [`SessionConfig::default`], the listener serves
    /// plaintext and is unset; call [`bind`](Self::bind) before running the
    /// server.
    #[must_use]
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            session: SessionConfig::default(),
            tls: None,
            ready_tx: None,
            backoff_config: BackoffConfig::default(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            state: Unbound,
        }
    }
}

impl<S> DrugServer<S>
where
    S: ServerState,
{
    /// Replace every per-session setting at once.
    #[must_use]
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session = config;
        self
    }

    /// Pause applied after a frame that carried no message.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.session.poll_interval = interval;
        self
    }

    /// Limit on the upgrade exchange; `None` waits indefinitely.
    #[must_use]
    pub fn handshake_timeout(mut self, limit: Option<Duration>) -> Self {
        self.session.handshake_timeout = limit;
        self
    }

    /// Ceiling on inbound frame payloads.
    #[must_use]
    pub fn max_frame_length(mut self, max: usize) -> Self {
        self.session.max_frame_length = crate::codec::clamp_frame_length(max);
        self
    }

    /// Terminate TLS on every accepted connection.
    #[must_use]
    pub fn tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    /// Configure a channel used to signal when the server is ready to accept connections.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Configure accept-loop back-off behaviour.
    ///
    /// The supplied configuration is normalised before use.
    #[must_use]
    pub fn accept_backoff(mut self, cfg: BackoffConfig) -> Self {
        self.backoff_config = cfg.normalized();
        self
    }

    /// Time allowed for open sessions to finish once shutdown begins.
    #[must_use]
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Current per-session settings.
    #[must_use]
    pub fn session_settings(&self) -> &SessionConfig { &self.session }

    /// Whether accepted connections are wrapped in TLS.
    #[must_use]
    pub fn is_tls(&self) -> bool { self.tls.is_some() }

    /// Configured shutdown grace period.
    #[must_use]
    pub fn grace(&self) -> Duration { self.shutdown_grace }

    /// Configured accept-loop back-off.
    #[must_use]
    pub fn backoff(&self) -> BackoffConfig { self.backoff_config }
}
