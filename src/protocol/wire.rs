//! Dubbo frame header.
//!
//! A frame is a fixed 16-byte header followed by a Hessian2-style body:
//!
//! ```text
//! 0xda 0xbb  flags  status  request_id[8]  data_length[4]  body[data_length]
//! ```
//!
//! `magic` is constant. `flags` marks the packet as request/response and
//! carries the serialization id; `status` is zero on requests. Multi-byte
//! header fields are big-endian.

use super::error::FrameError;
use bytes::{Buf, BufMut, BytesMut};

pub const MAGIC: [u8; 2] = [0xda, 0xbb];
pub const HEADER_LEN: usize = 16;

/// Serialization id 2 (Hessian2) | FLAG_REQUEST (0x80) | FLAG_TWOWAY (0x40).
const FLAG_REQUEST_TWOWAY_HESSIAN2: u8 = 0xc2;

pub const STATUS_OK: u8 = 20;

/// The fixed 12-byte prefix of a request frame (magic + flags + status +
/// zeroed request-id placeholder). The framer patches the request id in
/// before writing.
pub const DEFAULT_REQUEST_META: [u8; 12] = [
    MAGIC[0],
    MAGIC[1],
    FLAG_REQUEST_TWOWAY_HESSIAN2,
    0, // status, unused on requests
    0, 0, 0, 0, 0, 0, 0, 0, // request id placeholder
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub flags: u8,
    pub status: u8,
    pub request_id: i64,
    pub data_length: u32,
}

impl FrameHeader {
    pub fn is_request(&self) -> bool {
        self.flags & 0x80 != 0
    }

    pub fn is_event(&self) -> bool {
        self.flags & 0x20 != 0
    }
}

/// Encode `body` into a full request frame with the given request id.
pub fn encode_request_frame(request_id: i64, body: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
    buf.extend_from_slice(&MAGIC);
    buf.put_u8(FLAG_REQUEST_TWOWAY_HESSIAN2);
    buf.put_u8(0);
    buf.put_i64(request_id);
    buf.put_u32(body.len() as u32);
    buf.extend_from_slice(body);
    buf
}

/// Parse a 16-byte frame header from the front of `buf`. Returns `None` if
/// fewer than `HEADER_LEN` bytes are available (caller should read more).
pub fn decode_header(buf: &[u8]) -> Result<Option<FrameHeader>, FrameError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    if buf[0..2] != MAGIC {
        return Err(FrameError::BadMagic([buf[0], buf[1]]));
    }
    let mut cursor = &buf[2..];
    let flags = cursor.get_u8();
    let status = cursor.get_u8();
    let request_id = cursor.get_i64();
    let data_length = cursor.get_u32();
    Ok(Some(FrameHeader {
        flags,
        status,
        request_id,
        data_length,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_request_frame_header() {
        let frame = encode_request_frame(7, b"body");
        assert_eq!(&frame[0..2], &MAGIC);
        assert_eq!(frame[2], FLAG_REQUEST_TWOWAY_HESSIAN2);
        assert_eq!(frame[3], 0);
        assert_eq!(i64::from_be_bytes(frame[4..12].try_into().unwrap()), 7);
        assert_eq!(u32::from_be_bytes(frame[12..16].try_into().unwrap()), 4);
        assert_eq!(&frame[16..], b"body");
    }

    #[test]
    fn test_decode_header_roundtrip() {
        let frame = encode_request_frame(123, b"hello");
        let header = decode_header(&frame).unwrap().unwrap();
        assert_eq!(header.request_id, 123);
        assert_eq!(header.data_length, 5);
        assert!(header.is_request());
    }

    #[test]
    fn test_decode_header_needs_more_bytes() {
        let short = [0u8; 10];
        assert_eq!(decode_header(&short).unwrap(), None);
    }

    #[test]
    fn test_decode_header_bad_magic() {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0] = 0xff;
        bytes[1] = 0xff;
        assert!(matches!(decode_header(&bytes), Err(FrameError::BadMagic(_))));
    }
}
