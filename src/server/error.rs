//! Errors raised by [`DrugServer`](super::DrugServer) operations.

use std::io;

use thiserror::Error;

use super::tls::TlsError;

/// Errors that may occur while configuring or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or configuring the listener failed.
    #[error("bind error: {0}")]
    Bind(#[source] io::Error),
    /// Accepting a connection failed.
    #[error("accept error: {0}")]
    Accept(#[from] io::Error),
    /// The TLS certificate or key could not be loaded.
    #[error("tls setup failed: {0}")]
    Tls(#[from] TlsError),
}
