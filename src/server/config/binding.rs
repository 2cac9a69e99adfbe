//! Listener binding for [`DrugServer`].

use std::{
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use tokio::net::TcpListener;

use crate::server::{Bound, DrugServer, ServerError, ServerState, Unbound};

impl<S> DrugServer<S>
where
    S: ServerState,
{
    fn bind_to_listener(
        self,
        std_listener: StdTcpListener,
    ) -> Result<DrugServer<Bound>, ServerError> {
        let DrugServer {
            dispatcher,
            session,
            tls,
            ready_tx,
            backoff_config,
            shutdown_grace,
            ..
        } = self;

        std_listener
            .set_nonblocking(true)
            .map_err(ServerError::Bind)?;
        let tokio_listener = TcpListener::from_std(std_listener).map_err(ServerError::Bind)?;

        Ok(DrugServer {
            dispatcher,
            session,
            tls,
            ready_tx,
            backoff_config,
            shutdown_grace,
            state: Bound {
                listener: Arc::new(tokio_listener),
            },
        })
    }
}

impl DrugServer<Unbound> {
    /// Return `None` as the server is not bound.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> { None }

    /// Bind to a fresh address.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::{
    ///     net::{Ipv4Addr, SocketAddr},
    ///     sync::Arc,
    /// };
    ///
    /// use drugwire::{
    ///     cache::LookupCache,
    ///     dispatch::Dispatcher,
    ///     server::DrugServer,
    ///     store::SqliteStore,
    /// };
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let store = Arc::new(SqliteStore::in_memory()?);
    /// let dispatcher = Dispatcher::new(store, Arc::new(LookupCache::new()));
    /// let server = DrugServer::new(dispatcher).bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))?;
    /// assert!(server.local_addr().is_some());
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns a [`ServerError`] if binding or configuring the listener fails.
    pub fn bind(self, addr: SocketAddr) -> Result<DrugServer<Bound>, ServerError> {
        let std_listener = StdTcpListener::bind(addr).map_err(ServerError::Bind)?;
        self.bind_existing_listener(std_listener)
    }

    /// Bind to an existing `StdTcpListener`.
    ///
    /// # Errors
    /// Returns a [`ServerError`] if configuring the listener fails.
    pub fn bind_existing_listener(
        self,
        std_listener: StdTcpListener,
    ) -> Result<DrugServer<Bound>, ServerError> {
        self.bind_to_listener(std_listener)
    }
}

impl DrugServer<Bound> {
    /// Returns the bound address, or `None` if retrieving it fails.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> { self.state.listener.local_addr().ok() }

    /// Rebind to a fresh address.
    ///
    /// # Errors
    /// Returns a [`ServerError`] if binding or configuring the listener fails.
    pub fn bind(self, addr: SocketAddr) -> Result<Self, ServerError> {
        let std_listener = StdTcpListener::bind(addr).map_err(ServerError::Bind)?;
        self.bind_existing_listener(std_listener)
    }

    /// Rebind using an existing `StdTcpListener`.
    ///
    /// # Errors
    /// Returns a [`ServerError`] if configuring the listener fails.
    pub fn bind_existing_listener(self, std_listener: StdTcpListener) -> Result<Self, ServerError> {
        self.bind_to_listener(std_listener)
    }
}
