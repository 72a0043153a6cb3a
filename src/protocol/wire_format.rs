//! Wire format encoding and decoding.
//!
//! Every control message is a single length-prefixed frame:
//! ```text
//! ┌──────────┬──────────────────┐
//! │ Length   │ Payload          │
//! │ 4 bytes  │ `Length` bytes   │
//! │ int32 BE │                  │
//! └──────────┴──────────────────┘
//! ```
//!
//! The length is read as a signed 32-bit integer. The format has no use for the
//! sign bit, so a negative length is always a framing error.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{RelayError, Result};

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest length the prefix can carry without setting the sign bit.
pub const ABSOLUTE_MAX_PAYLOAD_SIZE: u32 = i32::MAX as u32;

/// Encode a payload as a frame.
///
/// # Example
///
/// ```
/// use socket_relay::protocol::encode;
///
/// let frame = encode(b"hi").unwrap();
/// assert_eq!(&frame[..], &[0, 0, 0, 2, b'h', b'i']);
/// ```
pub fn encode(payload: &[u8]) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(encoded_len(payload.len()));
    encode_into(&mut buf, payload)?;
    Ok(buf.freeze())
}

/// Append a frame for `payload` to `buf`.
///
/// Fails only if the payload length does not fit in 32 bits.
pub fn encode_into(buf: &mut BytesMut, payload: &[u8]) -> Result<()> {
    let length = u32::try_from(payload.len()).map_err(|_| RelayError::FrameTooLarge {
        length: payload.len() as u64,
        max: u64::from(u32::MAX),
    })?;
    buf.reserve(encoded_len(payload.len()));
    buf.put_u32(length);
    buf.put_slice(payload);
    Ok(())
}

/// Total frame size for a payload of `payload_len` bytes.
#[inline]
pub fn encoded_len(payload_len: usize) -> usize {
    LENGTH_PREFIX_SIZE + payload_len
}

/// Decode the length prefix from the first four bytes of a frame.
///
/// Returns `None` if fewer than four bytes are given. The result may be
/// negative; see [`validate_length`].
///
/// # Example
///
/// ```
/// use socket_relay::protocol::decode_length;
///
/// assert_eq!(decode_length(&[0, 0, 1, 0]), Some(256));
/// assert_eq!(decode_length(&[0xFF, 0xFF, 0xFF, 0xFF]), Some(-1));
/// assert_eq!(decode_length(&[0, 0]), None);
/// ```
#[inline]
pub fn decode_length(buf: &[u8]) -> Option<i32> {
    let prefix: [u8; LENGTH_PREFIX_SIZE] = buf.get(..LENGTH_PREFIX_SIZE)?.try_into().ok()?;
    Some(i32::from_be_bytes(prefix))
}

/// Check a decoded length against the sign rule and an optional maximum.
pub fn validate_length(length: i32, max_payload_size: Option<u32>) -> Result<u32> {
    let length = u32::try_from(length).map_err(|_| RelayError::NegativeLength(length))?;
    match max_payload_size {
        Some(max) if length > max => Err(RelayError::FrameTooLarge {
            length: u64::from(length),
            max: u64::from(max),
        }),
        _ => Ok(length),
    }
}
