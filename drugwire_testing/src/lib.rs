//! Test helpers for exercising a `drugwire` server from the client side.
//!
//! The server only ever sees masked client frames and answers with unmasked
//! text frames, so these helpers build the former and parse the latter.
//! [`WsClient`] wraps any async stream (a TCP socket, a TLS stream or one half
//! of a `tokio::io::duplex` pair) and performs the upgrade before handing out
//! request/reply helpers.
//!
//! ```rust,no_run
//! use drugwire_testing::WsClient;
//!
//! # async fn example(addr: std::net::SocketAddr) -> std::io::Result<()> {
//! let mut client = WsClient::connect(addr).await?;
//! let reply = client
//!     .request(&serde_json::json!({"action": "query_druginfo", "name": "a"}))
//!     .await?;
//! assert_eq!(reply["success"], serde_json::json!(true));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod frames;
pub mod listener;
pub mod store;

pub use client::WsClient;
pub use frames::{
    CLIENT_MASK,
    SAMPLE_KEY,
    SAMPLE_KEY_ACCEPT,
    ServerFrame,
    client_frame,
    close_frame,
    parse_server_frame,
    ping_frame,
    text_frame,
    upgrade_request,
};
pub use listener::unused_listener;
pub use store::FlakyStore;

/// Result type shared by integration tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
