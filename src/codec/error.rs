//! Error types for the frame codec.
//!
//! The taxonomy separates wire-level framing faults, protocol faults found
//! after a frame boundary is known, premature end-of-stream, and transport
//! I/O. Every variant is fatal for the connection that produced it; the
//! session closes the socket as soon as the codec reports one.
//!
//! - [`FramingError`]: malformed length fields and oversized frames.
//! - [`ProtocolError`]: payloads that cannot be interpreted (invalid UTF-8).
//! - [`EofError`]: the peer hung up inside a frame header or payload.
//! - [`CodecError`]: top-level enum wrapping all categories plus I/O errors.

use std::io;

use thiserror::Error;

/// Framing-level errors occurring while resolving frame boundaries.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// Frame length exceeds the configured or protocol maximum.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Payload size announced by the header or offered for encoding.
        size: u64,
        /// Maximum allowed payload size.
        max: u64,
    },

    /// The 64-bit extended length has its most significant bit set.
    #[error("invalid frame length encoding")]
    InvalidLengthEncoding,
}

/// Protocol-level errors occurring after a complete frame was extracted.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A text frame carried bytes that are not valid UTF-8.
    #[error("text frame is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 {
        /// Length of the longest valid UTF-8 prefix.
        valid_up_to: usize,
    },
}

/// Premature end-of-stream inside a frame.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// The peer closed the stream before the header was complete.
    #[error("premature EOF in frame header: {bytes_received} of {header_size} bytes received")]
    MidHeader {
        /// Header bytes received before EOF.
        bytes_received: usize,
        /// Header length implied by the bytes seen so far.
        header_size: usize,
    },

    /// The peer closed the stream while the payload was being read.
    #[error("premature EOF: {bytes_received} bytes of {expected} byte payload received")]
    MidFrame {
        /// Payload bytes received before EOF.
        bytes_received: usize,
        /// Payload length announced by the header.
        expected: usize,
    },
}

/// Top-level codec error.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Framing layer error.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Protocol layer error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport layer I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Premature end-of-stream.
    #[error("EOF: {0}")]
    Eof(#[from] EofError),
}

impl CodecError {
    /// Returns the error category as a string for logging and metrics.
    ///
    /// # Examples
    ///
    /// ```
    /// use drugwire::codec::{CodecError, FramingError};
    ///
    /// let err = CodecError::Framing(FramingError::InvalidLengthEncoding);
    /// assert_eq!(err.error_type(), "framing");
    /// ```
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Framing(_) => "framing",
            Self::Protocol(_) => "protocol",
            Self::Io(_) => "io",
            Self::Eof(_) => "eof",
        }
    }

    /// Returns true when the error only rejected an outbound message.
    ///
    /// Oversized replies are refused before any byte reaches the write
    /// buffer, so the connection itself is still intact.
    #[must_use]
    pub fn is_oversized(&self) -> bool {
        matches!(self, Self::Framing(FramingError::OversizedFrame { .. }))
    }
}

impl From<CodecError> for io::Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => e,
            CodecError::Framing(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            CodecError::Protocol(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            CodecError::Eof(e) => io::Error::new(io::ErrorKind::UnexpectedEof, e),
        }
    }
}
