//! HTTP upgrade negotiation.
//!
//! A freshly accepted stream must open with an HTTP request carrying an
//! `Upgrade: websocket` header and a `Sec-WebSocket-Key`. The request is read
//! up to its blank line, answered with a fixed `101 Switching Protocols`
//! response, and any bytes that arrived after the blank line are handed back
//! through a [`RewindStream`] so the frame codec sees them first.

use std::io;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::rewind_stream::RewindStream;

/// Largest upgrade request accepted, including the terminating blank line.
pub const MAX_REQUEST_LEN: usize = 4096;

/// GUID appended to the client key before hashing (RFC 6455 section 1.3).
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";
const READ_CHUNK: usize = 1024;

/// Errors that abort the upgrade. The connection is dropped without a reply.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// No blank line was found within [`MAX_REQUEST_LEN`] bytes.
    #[error("upgrade request exceeds {max} bytes")]
    TooLong {
        /// Ceiling that was hit.
        max: usize,
    },
    /// The peer closed the stream before the request was complete.
    #[error("connection closed after {received} bytes of upgrade request")]
    Incomplete {
        /// Bytes read before EOF.
        received: usize,
    },
    /// The request lacks an `Upgrade: websocket` header.
    #[error("request is not a websocket upgrade")]
    NotUpgrade,
    /// The request lacks a usable `Sec-WebSocket-Key` header.
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,
    /// The peer did not finish the request in time.
    #[error("upgrade request timed out")]
    TimedOut,
    /// Transport failure while reading or writing.
    #[error("I/O error during handshake: {0}")]
    Io(#[from] io::Error),
}

/// The parts of an upgrade request the server acts on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Value of `Sec-WebSocket-Key`, trimmed.
    pub key: String,
}

/// Compute the `Sec-WebSocket-Accept` token for a client key.
///
/// # Examples
///
/// ```
/// use drugwire::handshake::accept_key;
///
/// assert_eq!(
///     accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
#[must_use]
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.trim().as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Validate an upgrade request head.
///
/// Header names and the `websocket` token are matched case-insensitively.
///
/// # Errors
///
/// Returns [`HandshakeError::NotUpgrade`] or [`HandshakeError::MissingKey`]
/// when the corresponding header is absent.
pub fn parse_upgrade_request(head: &str) -> Result<UpgradeRequest, HandshakeError> {
    let mut upgrade = false;
    let mut key = None;

    for line in head.split("\r\n").skip(1) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("upgrade") {
            upgrade |= value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("websocket"));
        } else if name.eq_ignore_ascii_case("sec-websocket-key") && !value.is_empty() {
            key = Some(value.to_owned());
        }
    }

    if !upgrade {
        return Err(HandshakeError::NotUpgrade);
    }
    key.map(|key| UpgradeRequest { key })
        .ok_or(HandshakeError::MissingKey)
}

fn find_terminator(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
        .map(|pos| from + pos)
}

/// Read an upgrade request head, returning it with any bytes read past it.
///
/// # Errors
///
/// Returns a [`HandshakeError`] if the request is too long, incomplete,
/// malformed, or an I/O error occurs while reading from `reader`.
pub async fn read_upgrade_request<R>(
    reader: &mut R,
) -> Result<(UpgradeRequest, Vec<u8>), HandshakeError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0_u8; READ_CHUNK];
    loop {
        let room = MAX_REQUEST_LEN - buf.len();
        if room == 0 {
            return Err(HandshakeError::TooLong {
                max: MAX_REQUEST_LEN,
            });
        }
        let n = reader.read(&mut chunk[..room.min(READ_CHUNK)]).await?;
        if n == 0 {
            return Err(HandshakeError::Incomplete {
                received: buf.len(),
            });
        }
        let search_from = buf.len().saturating_sub(HEAD_TERMINATOR.len() - 1);
        buf.extend_from_slice(&chunk[..n]);

        if let Some(pos) = find_terminator(&buf, search_from) {
            let leftover = buf.split_off(pos + HEAD_TERMINATOR.len());
            let head = String::from_utf8_lossy(&buf);
            let request = parse_upgrade_request(&head)?;
            return Ok((request, leftover));
        }
    }
}

/// Write the `101 Switching Protocols` response.
///
/// # Errors
///
/// Returns any I/O error raised while writing or flushing.
pub async fn write_switching_protocols<W>(writer: &mut W, accept: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: \
         websocket\r\nSec-WebSocket-Accept: {accept}\r\n\r\n"
    );
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await
}

/// Run the full server-side upgrade on `stream`.
///
/// # Errors
///
/// Returns a [`HandshakeError`] if the request is rejected or the stream
/// fails. Nothing is written to the peer on rejection.
pub async fn negotiate<S>(mut stream: S) -> Result<RewindStream<S>, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (request, leftover) = read_upgrade_request(&mut stream).await?;
    write_switching_protocols(&mut stream, &accept_key(&request.key)).await?;
    Ok(RewindStream::new(leftover, stream))
}
