//! TLS termination for accepted connections.
//!
//! The server is handed a PEM certificate chain and private key; it never
//! provisions certificates itself. Without a configured acceptor the listener
//! serves plaintext.

use std::{fs, io, path::Path, sync::Arc};

use rustls::{
    ServerConfig,
    pki_types::{CertificateDer, PrivateKeyDer, pem::PemObject},
};
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

/// Failures while building a TLS acceptor.
#[derive(Debug, Error)]
pub enum TlsError {
    /// A PEM file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    /// The certificate file is not valid PEM.
    #[error("invalid certificate PEM: {0}")]
    Certificate(String),
    #[error("certificate PEM contains no certificates")]
    EmptyChain,
    /// The key file is not valid PEM or holds no private key.
    #[error("invalid private key PEM: {0}")]
    PrivateKey(String),
    /// rustls refused the certificate and key pair.
    #[error("TLS configuration rejected: {0}")]
    Config(#[from] rustls::Error),
}

fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    fs::read(path).map_err(|source| TlsError::Read {
        path: path.display().to_string(),
        source,
    })
}

/// Build an acceptor from PEM files on disk.
///
/// # Errors
///
/// Returns [`TlsError`] if either file cannot be read or parsed, or if the
/// key does not match the certificate.
pub fn load_acceptor(cert: &Path, key: &Path) -> Result<TlsAcceptor, TlsError> {
    acceptor_from_pem(&read(cert)?, &read(key)?)
}

/// Build an acceptor from an in-memory PEM chain and private key.
///
/// # Errors
///
/// Returns [`TlsError`] if the PEM data is malformed or the key does not
/// match the leaf certificate.
pub fn acceptor_from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<TlsAcceptor, TlsError> {
    let chain = CertificateDer::pem_slice_iter(cert_pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::Certificate(e.to_string()))?;
    if chain.is_empty() {
        return Err(TlsError::EmptyChain);
    }
    let key =
        PrivateKeyDer::from_pem_slice(key_pem).map_err(|e| TlsError::PrivateKey(e.to_string()))?;

    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_no_client_auth()
    .with_single_cert(chain, key)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}
