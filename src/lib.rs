#![doc(html_root_url = "https://docs.rs/drugwire/latest")]
//! Public API for the `drugwire` library.
//!
//! A persistent-connection server recording pharmaceutical batch and lot
//! metadata. Clients upgrade a TCP (optionally TLS) connection to a
//! WebSocket and exchange JSON action messages; each message is mapped onto
//! a typed record, routed to a handler and answered with exactly one reply.
//! A lookup cache of the latest manufacture date per drug name sits in front
//! of a SQLite record store.

pub mod cache;
pub mod cli;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod handshake;
pub mod mapper;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod panic;
pub mod protocol;
pub mod rewind_stream;
pub mod server;
pub mod session;
pub mod store;

pub use cache::LookupCache;
pub use codec::{CodecError, Frame, WebSocketCodec};
pub use dispatch::{Dispatcher, Reply};
pub use mapper::{FieldKind, FieldSpec, FieldValue, MapError, Mapped};
pub use protocol::{DrugRecord, ServerResponse};
pub use server::{DrugServer, ServerError};
pub use session::{ConnectionId, Session, SessionConfig};
pub use store::{RecordStore, SqliteStore, StoreError};
