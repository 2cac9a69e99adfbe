//! Byte-level builders for client frames and a parser for server frames.

/// Mask key applied to every frame built here.
pub const CLIENT_MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

/// The sample key from RFC 6455 section 1.3.
pub const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
/// The accept token a server must derive from [`SAMPLE_KEY`].
pub const SAMPLE_KEY_ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

const FIN: u8 = 0x80;
const MASKED: u8 = 0x80;

/// Build a masked client frame with FIN set.
///
/// Payloads of 65536 bytes or more use the 8-byte length form.
#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    reason = "each match arm bounds the length to the target width"
)]
pub fn client_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 14);
    frame.push(FIN | (opcode & 0x0f));
    match payload.len() {
        len @ 0..=125 => frame.push(MASKED | len as u8),
        len @ 126..=0xffff => {
            frame.push(MASKED | 126);
            frame.extend_from_slice(&(len as u16).to_be_bytes());
        }
        len => {
            frame.push(MASKED | 127);
            frame.extend_from_slice(&(len as u64).to_be_bytes());
        }
    }
    frame.extend_from_slice(&CLIENT_MASK);
    frame.extend(
        payload
            .iter()
            .zip(CLIENT_MASK.iter().cycle())
            .map(|(byte, key)| byte ^ key),
    );
    frame
}

/// A masked text frame carrying `text`.
#[must_use]
pub fn text_frame(text: &str) -> Vec<u8> { client_frame(0x1, text.as_bytes()) }

/// A masked close frame with no payload.
#[must_use]
pub fn close_frame() -> Vec<u8> { client_frame(0x8, &[]) }

/// A masked ping frame.
#[must_use]
pub fn ping_frame(payload: &[u8]) -> Vec<u8> { client_frame(0x9, payload) }

/// A minimal upgrade request for `key`.
#[must_use]
pub fn upgrade_request(key: &str) -> String {
    format!(
        "GET / HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\nConnection: \
         Upgrade\r\nSec-WebSocket-Key: {key}\r\nSec-WebSocket-Version: 13\r\n\r\n"
    )
}

/// A frame written by the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerFrame {
    pub fin: bool,
    pub opcode: u8,
    pub masked: bool,
    pub payload: Vec<u8>,
}

impl ServerFrame {
    /// The payload as UTF-8 text, if it is valid.
    #[must_use]
    pub fn text(&self) -> Option<&str> { std::str::from_utf8(&self.payload).ok() }
}

/// Parse one frame from the front of `buf`.
///
/// Returns the frame and the number of bytes it occupied, or `None` when
/// `buf` does not yet hold a complete frame.
#[must_use]
pub fn parse_server_frame(buf: &[u8]) -> Option<(ServerFrame, usize)> {
    let [first, second, ..] = *buf else {
        return None;
    };
    let masked = second & 0x80 != 0;
    let (len, mut offset) = match second & 0x7f {
        126 => (u64::from(u16::from_be_bytes(buf.get(2..4)?.try_into().ok()?)), 4),
        127 => (u64::from_be_bytes(buf.get(2..10)?.try_into().ok()?), 10),
        short => (u64::from(short), 2),
    };
    let mask = if masked {
        let key: [u8; 4] = buf.get(offset..offset + 4)?.try_into().ok()?;
        offset += 4;
        Some(key)
    } else {
        None
    };
    let end = offset + usize::try_from(len).ok()?;
    let mut payload = buf.get(offset..end)?.to_vec();
    if let Some(key) = mask {
        for (byte, k) in payload.iter_mut().zip(key.iter().cycle()) {
            *byte ^= k;
        }
    }
    let frame = ServerFrame {
        fin: first & 0x80 != 0,
        opcode: first & 0x0f,
        masked,
        payload,
    };
    Some((frame, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_frame_unmasks_back() {
        let bytes = client_frame(0x1, b"hello");
        let (frame, used) = parse_server_frame(&bytes).expect("complete frame");

        assert_eq!(used, bytes.len());
        assert!(frame.masked);
        assert_eq!(frame.text(), Some("hello"));
    }

    #[test]
    fn partial_frame_is_incomplete() {
        let bytes = client_frame(0x1, &[b'a'; 300]);

        assert!(parse_server_frame(&bytes[..bytes.len() - 1]).is_none());
        assert!(parse_server_frame(&bytes[..3]).is_none());
    }

    #[test]
    fn large_payload_uses_long_length() {
        let bytes = client_frame(0x2, &vec![0; 70_000]);

        assert_eq!(bytes[1], 0x80 | 127);
        assert_eq!(bytes.len(), 2 + 8 + 4 + 70_000);
    }
}
