//! Binary frame format for the bus.
//!
//! Frame layout (4-byte length prefix + body, all integers big-endian):
//!
//! ```text
//! +--------------+--------+------------+------------+----------+-------------+
//! | frame_length |  kind  | request_id | method_len |  method  | entry_count |
//! |   4 bytes    | 1 byte |  8 bytes   |  2 bytes   | variable |   4 bytes   |
//! +--------------+--------+------------+------------+----------+-------------+
//! | {[key_len:u16][key][val_len:u32][val]} * entry_count                     |
//! +--------------------------------------------------------------------------+
//! ```
//!
//! `frame_length` counts every byte after the length field itself. `method`
//! is present only when `method_len > 0` (Request and Register frames). The
//! field order and widths are the compatibility contract between
//! independently built peers.

use crate::error::ProtocolError;
use crate::message::{Kind, Message};
use crate::payload::Payload;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the frame length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Maximum frame body size (16 MiB). Frames declaring more fail the
/// connection.
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Encodes a message into a single wire frame.
pub fn encode(msg: &Message) -> Result<BytesMut, ProtocolError> {
    let method = msg.method.as_bytes();
    if method.len() > u16::MAX as usize {
        return Err(ProtocolError::MethodTooLong(method.len()));
    }

    let mut body_len: u64 = 1 + 8 + 2 + method.len() as u64 + 4;
    for (key, value) in msg.payload.iter() {
        if key.len() > u16::MAX as usize {
            return Err(ProtocolError::KeyTooLong(key.len()));
        }
        body_len += 2 + key.len() as u64 + 4 + value.len() as u64;
    }
    if body_len > MAX_FRAME_SIZE as u64 {
        return Err(ProtocolError::FrameTooLarge {
            size: body_len.min(u32::MAX as u64) as u32,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + body_len as usize);
    buf.put_u32(body_len as u32);
    buf.put_u8(msg.kind as u8);
    buf.put_u64(msg.request_id);
    buf.put_u16(method.len() as u16);
    buf.put_slice(method);
    buf.put_u32(msg.payload.len() as u32);
    for (key, value) in msg.payload.iter() {
        buf.put_u16(key.len() as u16);
        buf.put_slice(key.as_bytes());
        buf.put_u32(value.len() as u32);
        buf.put_slice(value.as_bytes());
    }

    Ok(buf)
}

/// Decodes a message from the front of `buf`.
///
/// Returns `Ok(Some(message))` if a complete frame was consumed,
/// `Ok(None)` if more data is needed, or `Err` on protocol violations.
/// Partial frames leave `buf` untouched so the caller can keep reading.
pub fn decode(buf: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    // Peek at the length prefix without consuming.
    let frame_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if frame_len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: frame_len,
            max: MAX_FRAME_SIZE,
        });
    }

    let total_len = LENGTH_PREFIX_SIZE + frame_len as usize;
    if buf.len() < total_len {
        return Ok(None);
    }

    buf.advance(LENGTH_PREFIX_SIZE);
    let mut body = buf.split_to(frame_len as usize).freeze();

    let kind = Kind::from_wire(take(&mut body, 1, "kind")?[0])?;
    let request_id = take(&mut body, 8, "request_id")?.get_u64();

    let method_len = take(&mut body, 2, "method_len")?.get_u16() as usize;
    let method = string_field(take(&mut body, method_len, "method")?, "method")?;

    let entry_count = take(&mut body, 4, "entry_count")?.get_u32();
    let mut payload = Payload::new();
    for _ in 0..entry_count {
        let key_len = take(&mut body, 2, "key_len")?.get_u16() as usize;
        let key = string_field(take(&mut body, key_len, "key")?, "key")?;
        let val_len = take(&mut body, 4, "val_len")?.get_u32() as usize;
        let value = string_field(take(&mut body, val_len, "value")?, "value")?;
        payload.set(key, value);
    }

    if body.has_remaining() {
        return Err(ProtocolError::TrailingBytes(body.remaining()));
    }

    Ok(Some(Message {
        kind,
        request_id,
        method,
        payload,
    }))
}

fn take(body: &mut Bytes, n: usize, field: &'static str) -> Result<Bytes, ProtocolError> {
    if body.remaining() < n {
        return Err(ProtocolError::Truncated(field));
    }
    Ok(body.split_to(n))
}

fn string_field(bytes: Bytes, field: &'static str) -> Result<String, ProtocolError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidUtf8(field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn roundtrip(msg: &Message) -> Message {
        let mut buf = encode(msg).unwrap();
        let decoded = decode(&mut buf).unwrap().unwrap();
        assert!(buf.is_empty());
        decoded
    }

    #[test]
    fn test_request_roundtrip() {
        let msg = Message::request(
            42,
            "echo",
            Payload::new().with("name", "BBT").with("lang", "rust"),
        );
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn test_response_roundtrip() {
        let msg = Message::response(42, Payload::new().with("greeting", "Hello, BBT"));
        assert_eq!(roundtrip(&msg), msg);
        assert!(msg.method.is_empty());
    }

    #[test]
    fn test_error_roundtrip() {
        let msg = Message::error(9, ErrorCode::MethodNotFound, "no handler for 'echo'");
        let decoded = roundtrip(&msg);
        assert_eq!(decoded.error_code(), ErrorCode::MethodNotFound);
        assert_eq!(decoded.error_message(), "no handler for 'echo'");
    }

    #[test]
    fn test_register_roundtrip() {
        let msg = Message::register(1, "echo");
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn test_empty_payload_roundtrip() {
        let msg = Message::request(1, "noop", Payload::new());
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn test_incomplete_length_prefix() {
        let mut buf = BytesMut::from(&[0u8, 0, 0][..]);
        assert!(decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_incomplete_body_leaves_buffer_untouched() {
        let msg = Message::request(7, "echo", Payload::new().with("k", "v"));
        let encoded = encode(&msg).unwrap();

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encoded[..encoded.len() - 1]);
        let before = buf.len();
        assert!(decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), before);

        buf.extend_from_slice(&encoded[encoded.len() - 1..]);
        assert_eq!(decode(&mut buf).unwrap().unwrap(), msg);
    }

    #[test]
    fn test_multiple_frames_in_buffer() {
        let first = Message::request(1, "a", Payload::new());
        let second = Message::request(2, "b", Payload::new());

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode(&first).unwrap());
        buf.extend_from_slice(&encode(&second).unwrap());

        assert_eq!(decode(&mut buf).unwrap().unwrap(), first);
        assert_eq!(decode(&mut buf).unwrap().unwrap(), second);
        assert!(decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_declared_length_over_max() {
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_FRAME_SIZE + 1);
        buf.put_u8(1);
        let result = decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_unknown_kind() {
        let mut buf = BytesMut::new();
        buf.put_u32(15);
        buf.put_u8(0xEE);
        buf.put_u64(1);
        buf.put_u16(0);
        buf.put_u32(0);
        let result = decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::UnknownKind(0xEE))));
    }

    #[test]
    fn test_truncated_fields() {
        // Declared body of 5 bytes: kind fits, request_id is cut short.
        let mut buf = BytesMut::new();
        buf.put_u32(5);
        buf.put_u8(1);
        buf.put_u32(0);
        let result = decode(&mut buf);
        assert!(matches!(
            result,
            Err(ProtocolError::Truncated("request_id"))
        ));
    }

    #[test]
    fn test_entry_count_exceeding_body() {
        // Valid envelope claiming one entry with no entry bytes present.
        let mut buf = BytesMut::new();
        buf.put_u32(15);
        buf.put_u8(2);
        buf.put_u64(3);
        buf.put_u16(0);
        buf.put_u32(1);
        let result = decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::Truncated("key_len"))));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let msg = Message::response(4, Payload::new());
        let encoded = encode(&msg).unwrap();

        // Re-declare the frame one byte longer and append a stray byte.
        let mut buf = BytesMut::new();
        let body_len = (encoded.len() - LENGTH_PREFIX_SIZE + 1) as u32;
        buf.put_u32(body_len);
        buf.extend_from_slice(&encoded[LENGTH_PREFIX_SIZE..]);
        buf.put_u8(0xAA);

        let result = decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::TrailingBytes(1))));
    }

    #[test]
    fn test_invalid_utf8_method() {
        let mut buf = BytesMut::new();
        buf.put_u32(17);
        buf.put_u8(1);
        buf.put_u64(1);
        buf.put_u16(2);
        buf.put_slice(&[0xFF, 0xFE]);
        buf.put_u32(0);
        let result = decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::InvalidUtf8("method"))));
    }

    #[test]
    fn test_encode_oversized_payload() {
        let msg = Message::request(
            1,
            "blob",
            Payload::new().with("data", "x".repeat(MAX_FRAME_SIZE as usize)),
        );
        let result = encode(&msg);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
    }
}

#[cfg(test)]
mod properties {
    use super::*;
    use proptest::prelude::*;

    fn arb_payload() -> impl Strategy<Value = Payload> {
        proptest::collection::vec(("[a-z]{1,12}", ".{0,64}"), 0..8)
            .prop_map(|entries| entries.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_encode_decode_encode_is_stable(
            request_id in any::<u64>(),
            method in "[a-z_]{1,24}",
            payload in arb_payload(),
        ) {
            let msg = Message::request(request_id, method, payload);
            let encoded = encode(&msg).unwrap();

            let mut buf = encoded.clone();
            let decoded = decode(&mut buf).unwrap().unwrap();
            prop_assert!(buf.is_empty());

            let re_encoded = encode(&decoded).unwrap();
            prop_assert_eq!(encoded, re_encoded);
        }

        #[test]
        fn prop_decode_never_panics_on_arbitrary_bytes(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut buf = BytesMut::from(&data[..]);
            // Arbitrary input may be an error or an incomplete frame, never a panic.
            let _ = decode(&mut buf);
        }
    }
}
