//! A minimal WebSocket client speaking the server's text protocol.

use std::{io, net::SocketAddr};

use bytes::{Buf, BytesMut};
use serde_json::Value;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};

use crate::frames::{
    SAMPLE_KEY,
    SAMPLE_KEY_ACCEPT,
    ServerFrame,
    close_frame,
    parse_server_frame,
    text_frame,
    upgrade_request,
};

const HEADER_END: &[u8] = b"\r\n\r\n";

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Client half of an upgraded connection.
#[derive(Debug)]
pub struct WsClient<S> {
    stream: S,
    buf: BytesMut,
}

impl WsClient<TcpStream> {
    /// Connect to `addr` and perform the upgrade.
    ///
    /// # Errors
    ///
    /// Returns any connect or handshake failure.
    pub async fn connect(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Self::handshake(stream).await
    }
}

impl<S> WsClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Send an upgrade request over `stream` and validate the server's
    /// `101` response.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream closes early or the response is not a
    /// valid switch.
    pub async fn handshake(mut stream: S) -> io::Result<Self> {
        stream
            .write_all(upgrade_request(SAMPLE_KEY).as_bytes())
            .await?;
        let mut buf = BytesMut::with_capacity(1024);
        let end = loop {
            if let Some(pos) = buf.windows(HEADER_END.len()).position(|w| w == HEADER_END) {
                break pos + HEADER_END.len();
            }
            if stream.read_buf(&mut buf).await? == 0 {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
        };
        let head = buf.split_to(end);
        let head = std::str::from_utf8(&head).map_err(|e| invalid(e.to_string()))?;
        if !head.starts_with("HTTP/1.1 101") {
            return Err(invalid(format!("unexpected handshake response: {head}")));
        }
        if !head.contains(&format!("Sec-WebSocket-Accept: {SAMPLE_KEY_ACCEPT}\r\n")) {
            return Err(invalid("accept token mismatch"));
        }
        Ok(Self { stream, buf })
    }

    /// Write raw bytes to the server.
    ///
    /// # Errors
    ///
    /// Returns any write failure.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    /// Send `text` as one masked text frame.
    ///
    /// # Errors
    ///
    /// Returns any write failure.
    pub async fn send_text(&mut self, text: &str) -> io::Result<()> {
        self.send_raw(&text_frame(text)).await
    }

    /// Send `value` serialised as a text frame.
    ///
    /// # Errors
    ///
    /// Returns any write failure.
    pub async fn send_json(&mut self, value: &Value) -> io::Result<()> {
        self.send_text(&value.to_string()).await
    }

    /// Send a close frame.
    ///
    /// # Errors
    ///
    /// Returns any write failure.
    pub async fn send_close(&mut self) -> io::Result<()> { self.send_raw(&close_frame()).await }

    /// Read the next frame, or `None` if the server closed the stream.
    ///
    /// # Errors
    ///
    /// Returns any read failure, or `UnexpectedEof` if the stream ends
    /// inside a frame.
    pub async fn recv_frame(&mut self) -> io::Result<Option<ServerFrame>> {
        loop {
            if let Some((frame, used)) = parse_server_frame(&self.buf) {
                self.buf.advance(used);
                return Ok(Some(frame));
            }
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    Err(io::ErrorKind::UnexpectedEof.into())
                };
            }
        }
    }

    /// Read the next text frame's payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream closes or the payload is not UTF-8.
    pub async fn recv_text(&mut self) -> io::Result<String> {
        let frame = self
            .recv_frame()
            .await?
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        String::from_utf8(frame.payload).map_err(|e| invalid(e.to_string()))
    }

    /// Read the next text frame and parse it as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream closes or the payload is not JSON.
    pub async fn recv_json(&mut self) -> io::Result<Value> {
        let text = self.recv_text().await?;
        serde_json::from_str(&text).map_err(|e| invalid(e.to_string()))
    }

    /// Send `value` and wait for the reply.
    ///
    /// # Errors
    ///
    /// Returns any write, read or parse failure.
    pub async fn request(&mut self, value: &Value) -> io::Result<Value> {
        self.send_json(value).await?;
        self.recv_json().await
    }

    /// Whether the server has closed its side with nothing left to read.
    ///
    /// # Errors
    ///
    /// Returns any read failure, or `InvalidData` if a frame arrives instead.
    pub async fn is_closed_by_peer(&mut self) -> io::Result<bool> {
        match self.recv_frame().await? {
            None => Ok(true),
            Some(frame) => Err(invalid(format!("unexpected frame: {frame:?}"))),
        }
    }

    /// Give back the underlying stream.
    #[must_use]
    pub fn into_inner(self) -> S { self.stream }
}
