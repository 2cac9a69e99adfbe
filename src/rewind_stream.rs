//! Async stream adapter that replays leftover bytes.
//!
//! The handshake reader may pull bytes past the end of the upgrade request
//! when a client pipelines its first frame. `RewindStream` emits those bytes
//! before delegating reads and writes to the underlying stream.

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// A stream adapter that replays buffered bytes before reading
/// from the underlying stream.
#[derive(Debug)]
pub struct RewindStream<S> {
    leftover: Bytes,
    inner: S,
}

impl<S> RewindStream<S> {
    /// Create a new `RewindStream` that will yield `leftover` before
    /// delegating to `inner`.
    pub fn new(leftover: impl Into<Bytes>, inner: S) -> Self {
        Self {
            leftover: leftover.into(),
            inner,
        }
    }

    /// Number of replay bytes not yet consumed.
    #[must_use]
    pub fn pending(&self) -> usize { self.leftover.len() }

    /// Borrow the wrapped stream.
    pub fn get_ref(&self) -> &S { &self.inner }
}

impl<S: AsyncRead + Unpin> AsyncRead for RewindStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.leftover.is_empty() {
            let to_copy = self.leftover.len().min(buf.remaining());
            buf.put_slice(&self.leftover[..to_copy]);
            self.leftover.advance(to_copy);
            return Poll::Ready(Ok(()));
        }

        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for RewindStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
