//! Server configuration.
//!
//! Settings come from an optional TOML file; command line flags override
//! individual keys. Missing keys take the defaults below.
//!
//! ```toml
//! bind = "0.0.0.0:8443"
//! database = "druginfo.db"
//! poll_interval_ms = 100
//! handshake_timeout_ms = 10000   # 0 waits indefinitely
//! shutdown_grace_ms = 5000
//! max_frame_length = 16777216
//! metrics_addr = "127.0.0.1:9100"
//!
//! [tls]
//! cert = "server.crt"
//! key = "server.key"
//! ```

use std::{
    fs,
    io,
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    cli::Cli,
    codec::MAX_FRAME_LENGTH,
    server::BackoffConfig,
    session::{DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_POLL_INTERVAL, SessionConfig},
};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8443;
/// Default database file.
pub const DEFAULT_DATABASE: &str = "druginfo.db";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    /// The config file is not valid TOML or has unknown keys.
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// PEM files used to terminate TLS.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    /// Certificate chain PEM.
    pub cert: PathBuf,
    /// Private key PEM.
    pub key: PathBuf,
}

/// Everything the binary needs to start a server.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: SocketAddr,
    /// SQLite database file, created on first use.
    pub database: PathBuf,
    /// Serve `wss://` when set; plain `ws://` otherwise.
    pub tls: Option<TlsConfig>,
    /// Pause after a control frame, in milliseconds. Must be positive.
    pub poll_interval_ms: u64,
    /// Upgrade deadline in milliseconds; `0` waits indefinitely.
    pub handshake_timeout_ms: u64,
    /// How long shutdown waits for open sessions, in milliseconds.
    pub shutdown_grace_ms: u64,
    /// Inbound payload ceiling in bytes, clamped by the codec.
    pub max_frame_length: usize,
    /// First accept back-off delay in milliseconds.
    pub accept_backoff_initial_ms: u64,
    /// Accept back-off cap in milliseconds.
    pub accept_backoff_max_ms: u64,
    /// Prometheus exporter address, used with the `metrics` feature.
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let backoff = BackoffConfig::default();
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            database: PathBuf::from(DEFAULT_DATABASE),
            tls: None,
            poll_interval_ms: millis(DEFAULT_POLL_INTERVAL),
            handshake_timeout_ms: millis(DEFAULT_HANDSHAKE_TIMEOUT),
            shutdown_grace_ms: millis(crate::server::DEFAULT_SHUTDOWN_GRACE),
            max_frame_length: MAX_FRAME_LENGTH,
            accept_backoff_initial_ms: millis(backoff.initial_delay),
            accept_backoff_max_ms: millis(backoff.max_delay),
            metrics_addr: None,
        }
    }
}

fn millis(duration: Duration) -> u64 { u64::try_from(duration.as_millis()).unwrap_or(u64::MAX) }

impl ServerConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
    /// [`ConfigError::Invalid`] for values that cannot be used.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, otherwise
    /// as [`ServerConfig::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Build the effective configuration for a command line.
    ///
    /// # Errors
    ///
    /// Returns any failure loading the file named by `--config`, or
    /// [`ConfigError::Invalid`] if the merged result cannot be used.
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Overwrite every key the command line sets.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(bind) = cli.bind {
            self.bind = bind;
        }
        if let Some(database) = &cli.database {
            self.database.clone_from(database);
        }
        if let (Some(cert), Some(key)) = (&cli.tls_cert, &cli.tls_key) {
            self.tls = Some(TlsConfig {
                cert: cert.clone(),
                key: key.clone(),
            });
        }
        if let Some(addr) = cli.metrics_addr {
            self.metrics_addr = Some(addr);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database path must not be empty".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }
        Ok(())
    }

    /// Per-session settings derived from this configuration.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            handshake_timeout: (self.handshake_timeout_ms > 0)
                .then(|| Duration::from_millis(self.handshake_timeout_ms)),
            max_frame_length: crate::codec::clamp_frame_length(self.max_frame_length),
        }
    }

    /// Accept-loop back-off derived from this configuration.
    #[must_use]
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig::from_millis(self.accept_backoff_initial_ms, self.accept_backoff_max_ms)
    }

    /// Time allowed for sessions to finish after shutdown begins.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration { Duration::from_millis(self.shutdown_grace_ms) }
}
