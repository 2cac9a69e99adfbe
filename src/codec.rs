//! WebSocket frame codec.
//!
//! [`WebSocketCodec`] splits an upgraded byte stream into frames and wraps
//! outgoing replies as single unmasked text frames. Only the subset of
//! RFC 6455 the protocol needs is implemented: no extensions, no
//! fragmentation and no compression.
//!
//! # Error Handling
//!
//! The codec reports failures through the structured [`CodecError`]
//! taxonomy. Every decode error is fatal for the connection; an encode error
//! leaves the write buffer untouched. See the [`error`] module for details.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

pub mod error;

pub use error::{CodecError, EofError, FramingError, ProtocolError};

/// Minimum inbound payload ceiling in bytes.
///
/// Ceilings passed to [`WebSocketCodec::new`] are clamped to at least this
/// value.
pub const MIN_FRAME_LENGTH: usize = 64;

/// Maximum inbound payload ceiling in bytes (16 MiB).
///
/// Ceilings passed to [`WebSocketCodec::new`] are clamped to at most this
/// value to prevent unbounded memory allocation.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Largest payload the encoder will emit.
///
/// Replies are written with at most a 16-bit extended length, so anything
/// longer is refused.
pub const MAX_ENCODED_PAYLOAD: usize = 65_535;

/// Continuation frame opcode.
pub const OPCODE_CONTINUATION: u8 = 0x0;
/// Text frame opcode.
pub const OPCODE_TEXT: u8 = 0x1;
/// Binary frame opcode.
pub const OPCODE_BINARY: u8 = 0x2;
/// Close frame opcode.
pub const OPCODE_CLOSE: u8 = 0x8;
/// Ping frame opcode.
pub const OPCODE_PING: u8 = 0x9;
/// Pong frame opcode.
pub const OPCODE_PONG: u8 = 0xA;

const FIN_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;
const LEN_16_MARKER: u8 = 126;
const LEN_64_MARKER: u8 = 127;
const BASE_HEADER_LEN: usize = 2;
const MASK_KEY_LEN: usize = 4;

pub(crate) fn clamp_frame_length(value: usize) -> usize {
    value.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH)
}

/// A decoded inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A complete text (or binary) message decoded as UTF-8.
    Text(String),
    /// The peer sent a close frame; the stream is finished.
    Close,
    /// A frame carrying no application message (ping, pong, continuation or
    /// a reserved opcode). Its payload has been consumed and discarded.
    Control {
        /// Opcode of the discarded frame.
        opcode: u8,
    },
}

/// Apply a WebSocket masking key to `payload` in place.
///
/// Masking is an involution, so the same call unmasks.
pub fn mask_in_place(payload: &mut [u8], key: [u8; MASK_KEY_LEN]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % MASK_KEY_LEN];
    }
}

/// Codec for the server side of a WebSocket connection.
#[derive(Clone, Copy, Debug)]
pub struct WebSocketCodec {
    max_frame_length: usize,
}

impl WebSocketCodec {
    /// Construct a codec accepting inbound payloads up to `max_frame_length`.
    ///
    /// The ceiling is clamped to [`MIN_FRAME_LENGTH`]..=[`MAX_FRAME_LENGTH`].
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length: clamp_frame_length(max_frame_length),
        }
    }

    /// Return the inbound payload ceiling.
    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }
}

impl Default for WebSocketCodec {
    fn default() -> Self { Self::new(MAX_FRAME_LENGTH) }
}

/// Header fields resolved from the first bytes of a frame.
struct Header {
    opcode: u8,
    header_len: usize,
    payload_len: u64,
    mask: Option<[u8; MASK_KEY_LEN]>,
}

fn extended_len_bytes(len7: u8) -> usize {
    match len7 {
        LEN_16_MARKER => 2,
        LEN_64_MARKER => 8,
        _ => 0,
    }
}

/// Number of header bytes implied by the second header byte.
fn header_len(second: u8) -> usize {
    let mask_len = if second & MASK_BIT == 0 { 0 } else { MASK_KEY_LEN };
    BASE_HEADER_LEN + extended_len_bytes(second & 0x7F) + mask_len
}

/// Parse a frame header, returning `None` while more bytes are needed.
///
/// The caller must have checked that at least two bytes are buffered.
fn parse_header(src: &[u8]) -> Result<Option<Header>, FramingError> {
    let first = src[0];
    let second = src[1];
    let header_len = header_len(second);
    if src.len() < header_len {
        return Ok(None);
    }

    let len7 = second & 0x7F;
    let payload_len = match len7 {
        LEN_16_MARKER => u64::from(u16::from_be_bytes([src[2], src[3]])),
        LEN_64_MARKER => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&src[2..10]);
            let len = u64::from_be_bytes(raw);
            if len & (1 << 63) != 0 {
                return Err(FramingError::InvalidLengthEncoding);
            }
            len
        }
        short => u64::from(short),
    };

    let mask = (second & MASK_BIT != 0).then(|| {
        let mut key = [0u8; MASK_KEY_LEN];
        key.copy_from_slice(&src[header_len - MASK_KEY_LEN..header_len]);
        key
    });

    Ok(Some(Header {
        opcode: first & 0x0F,
        header_len,
        payload_len,
        mask,
    }))
}

impl Decoder for WebSocketCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < BASE_HEADER_LEN {
            return Ok(None);
        }
        if src[0] & 0x0F == OPCODE_CLOSE {
            src.clear();
            return Ok(Some(Frame::Close));
        }

        let Some(header) = parse_header(src)? else {
            return Ok(None);
        };

        let max = self.max_frame_length as u64;
        if header.payload_len > max {
            return Err(FramingError::OversizedFrame {
                size: header.payload_len,
                max,
            }
            .into());
        }
        let payload_len =
            usize::try_from(header.payload_len).map_err(|_| FramingError::OversizedFrame {
                size: header.payload_len,
                max,
            })?;

        let frame_len = header.header_len + payload_len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(header.header_len);
        let mut payload = src.split_to(payload_len);
        if let Some(key) = header.mask {
            mask_in_place(&mut payload, key);
        }

        match header.opcode {
            OPCODE_TEXT | OPCODE_BINARY => String::from_utf8(payload.to_vec())
                .map(|text| Some(Frame::Text(text)))
                .map_err(|e| {
                    ProtocolError::InvalidUtf8 {
                        valid_up_to: e.utf8_error().valid_up_to(),
                    }
                    .into()
                }),
            opcode => Ok(Some(Frame::Control { opcode })),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => Err(build_eof_error(src).into()),
        }
    }
}

/// Build the appropriate EOF error for a partially buffered frame.
///
/// - [`EofError::MidHeader`]: the header (including any extended length and masking key) is
///   incomplete.
/// - [`EofError::MidFrame`]: the header is complete but the payload is truncated.
fn build_eof_error(src: &BytesMut) -> EofError {
    let bytes_received = src.len();
    let header_size = src.get(1).map_or(BASE_HEADER_LEN, |second| header_len(*second));
    if bytes_received < header_size {
        return EofError::MidHeader {
            bytes_received,
            header_size,
        };
    }

    let expected = match parse_header(src) {
        Ok(Some(header)) => usize::try_from(header.payload_len).unwrap_or(usize::MAX),
        _ => 0,
    };
    EofError::MidFrame {
        bytes_received: bytes_received - header_size,
        expected,
    }
}

impl<'a> Encoder<&'a str> for WebSocketCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &'a str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.as_bytes();
        let len = payload.len();
        let oversized = || FramingError::OversizedFrame {
            size: len as u64,
            max: MAX_ENCODED_PAYLOAD as u64,
        };
        if len > MAX_ENCODED_PAYLOAD {
            return Err(oversized().into());
        }
        let short = u8::try_from(len).ok().filter(|short| *short < LEN_16_MARKER);
        let long = u16::try_from(len).map_err(|_| oversized())?;

        dst.reserve(BASE_HEADER_LEN + 2 + len);
        dst.put_u8(FIN_BIT | OPCODE_TEXT);
        match short {
            Some(short) => dst.put_u8(short),
            None => {
                dst.put_u8(LEN_16_MARKER);
                dst.put_u16(long);
            }
        }
        dst.extend_from_slice(payload);
        Ok(())
    }
}
