//! Per-connection protocol loop.
//!
//! A [`Session`] owns one accepted stream from handshake to close. It walks
//! `Connecting → Handshaking → Open → Closed`; in `Open` it decodes one
//! frame, dispatches it and writes exactly one reply before reading again.
//! Control frames carry no message, so the loop pauses for the poll interval
//! before the next read.

use std::{
    fmt,
    net::SocketAddr,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    select,
    time::{sleep, timeout},
};
use tokio_util::{codec::Framed, sync::CancellationToken};
use tracing::{debug, trace, warn};

use crate::{
    codec::{CodecError, Frame, MAX_FRAME_LENGTH, WebSocketCodec},
    dispatch::{Dispatcher, Reply},
    handshake::{self, HandshakeError},
    mapper,
    protocol::ServerResponse,
};

/// Default pause after a frame that carried no message.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Default limit on the upgrade exchange.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

const RESPONSE_TOO_LARGE: &str = "response too large";

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier assigned to a connection for log correlation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next process-unique identifier.
    #[must_use]
    pub fn next() -> Self { Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "conn-{}", self.0) }
}

/// Lifecycle of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Socket accepted, nothing read yet.
    Connecting,
    /// Reading the HTTP upgrade request.
    Handshaking,
    /// Exchanging frames.
    Open,
    /// Terminal; no further frames are read or written.
    Closed,
}

/// Tunables applied to every session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Pause after a control frame.
    pub poll_interval: Duration,
    /// Limit on the upgrade exchange; `None` waits indefinitely.
    pub handshake_timeout: Option<Duration>,
    /// Inbound payload ceiling handed to the codec.
    pub max_frame_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            handshake_timeout: Some(DEFAULT_HANDSHAKE_TIMEOUT),
            max_frame_length: MAX_FRAME_LENGTH,
        }
    }
}

/// Why an open session ended without error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent a close frame.
    ClientClosed,
    /// The stream ended at a frame boundary.
    EndOfStream,
    /// The server is shutting down.
    Shutdown,
}

/// Failures that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The upgrade request was rejected or never completed.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    /// A frame could not be read or written.
    #[error("codec failure: {0}")]
    Codec(#[from] CodecError),
}

/// One client connection.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    state: SessionState,
    dispatcher: Dispatcher,
    config: SessionConfig,
    shutdown: CancellationToken,
}

impl Session {
    /// Create a session for an accepted socket.
    #[must_use]
    pub fn new(
        peer_addr: Option<SocketAddr>,
        dispatcher: Dispatcher,
        config: SessionConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id: ConnectionId::next(),
            peer_addr,
            state: SessionState::Connecting,
            dispatcher,
            config,
            shutdown,
        }
    }

    /// Identifier used in log fields.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.id }

    #[must_use]
    pub fn state(&self) -> SessionState { self.state }

    fn transition(&mut self, next: SessionState) {
        debug!(
            id = %self.id,
            peer_addr = ?self.peer_addr,
            from = ?self.state,
            to = ?next,
            "session state"
        );
        self.state = next;
    }

    /// Drive the connection until it closes.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Handshake`] if the upgrade is rejected and
    /// [`SessionError::Codec`] on a fatal read or write failure. The session
    /// is `Closed` on every return path.
    pub async fn run<S>(&mut self, stream: S) -> Result<CloseReason, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        self.transition(SessionState::Handshaking);
        let upgraded = match self.handshake(stream).await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                #[cfg(feature = "metrics")]
                crate::metrics::inc_handshake_failures();
                self.transition(SessionState::Closed);
                return Err(e.into());
            }
        };

        self.transition(SessionState::Open);
        let mut framed = Framed::new(upgraded, WebSocketCodec::new(self.config.max_frame_length));
        let result = self.serve(&mut framed).await;
        self.transition(SessionState::Closed);
        result
    }

    async fn handshake<S>(
        &self,
        stream: S,
    ) -> Result<crate::rewind_stream::RewindStream<S>, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match self.config.handshake_timeout {
            Some(limit) => timeout(limit, handshake::negotiate(stream))
                .await
                .map_err(|_| HandshakeError::TimedOut)?,
            None => handshake::negotiate(stream).await,
        }
    }

    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    async fn serve<T>(
        &self,
        framed: &mut Framed<T, WebSocketCodec>,
    ) -> Result<CloseReason, SessionError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        loop {
            let next = select! {
                biased;

                () = self.shutdown.cancelled() => return Ok(CloseReason::Shutdown),
                next = framed.next() => next,
            };

            match next {
                None => return Ok(CloseReason::EndOfStream),
                Some(Err(e)) => {
                    #[cfg(feature = "metrics")]
                    crate::metrics::inc_errors();
                    return Err(e.into());
                }
                Some(Ok(Frame::Close)) => return Ok(CloseReason::ClientClosed),
                Some(Ok(Frame::Control { opcode })) => {
                    trace!(id = %self.id, opcode, "no message in frame; pausing");
                    select! {
                        biased;

                        () = self.shutdown.cancelled() => return Ok(CloseReason::Shutdown),
                        () = sleep(self.config.poll_interval) => {}
                    }
                }
                Some(Ok(Frame::Text(text))) => {
                    #[cfg(feature = "metrics")]
                    crate::metrics::inc_frames(crate::metrics::Direction::Inbound);
                    let reply = self.dispatcher.dispatch_text(&text).await;
                    self.send_reply(framed, &reply).await?;
                }
            }
        }
    }

    async fn send_reply<T>(
        &self,
        framed: &mut Framed<T, WebSocketCodec>,
        reply: &Reply,
    ) -> Result<(), CodecError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let text = reply.to_json().to_string();
        match framed.send(text.as_str()).await {
            Err(e) if e.is_oversized() => {
                warn!(id = %self.id, error = %e, "reply exceeds frame ceiling; sending failure");
                let fallback = oversized_fallback(reply).to_string();
                framed.send(fallback.as_str()).await?;
            }
            other => other?,
        }
        #[cfg(feature = "metrics")]
        crate::metrics::inc_frames(crate::metrics::Direction::Outbound);
        Ok(())
    }
}

/// A short failure reply standing in for one too large to encode.
///
/// Tagged replies keep their `action` and `requestId` so the client can
/// still correlate the failure.
fn oversized_fallback(reply: &Reply) -> Value {
    match reply {
        Reply::Standard(_) => mapper::encode(&ServerResponse::failure(RESPONSE_TOO_LARGE)),
        Reply::Custom(original) => {
            let mut map = Map::new();
            for key in ["action", "requestId"] {
                map.insert(
                    key.to_owned(),
                    original.get(key).cloned().unwrap_or(Value::Null),
                );
            }
            map.insert("success".to_owned(), Value::Bool(false));
            map.insert("message".to_owned(), Value::from(RESPONSE_TOO_LARGE));
            Value::Object(map)
        }
    }
}

#[cfg(test)]
mod tests;
