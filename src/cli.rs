//! Command line interface for the `drugwire` server.
//!
//! Every flag overrides the matching key of the optional TOML config file.

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

/// Command line arguments for the `drugwire` binary.
#[derive(Debug, Default, Parser)]
#[command(
    name = "drugwire",
    version,
    about = "Drug batch and lot record server over WebSocket"
)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Address to listen on.
    #[arg(short, long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,
    /// SQLite database file.
    #[arg(short, long, value_name = "PATH")]
    pub database: Option<PathBuf>,
    /// PEM certificate chain; enables TLS together with `--tls-key`.
    #[arg(long, value_name = "PEM", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,
    /// PEM private key for `--tls-cert`.
    #[arg(long, value_name = "PEM", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,
    /// Serve Prometheus metrics on this address.
    #[arg(long, value_name = "ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}
