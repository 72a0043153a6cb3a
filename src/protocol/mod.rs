//! Protocol module - wire format, frame reader, and record types.
//!
//! This module implements the framing used on the relay socket:
//! - 4-byte big-endian length prefix encoding/decoding
//! - Single-frame reader for accumulating partial reads
//! - Request and response-header records carried in the frames

mod frame_reader;
mod records;
mod wire_format;

pub use frame_reader::{FrameReader, Progress, ReaderState, DEFAULT_READ_CHUNK_SIZE};
pub use records::{HeaderValue, Headers, RequestRecord, ResponseHeaderRecord};
pub use wire_format::{
    decode_length, encode, encode_into, encoded_len, validate_length, ABSOLUTE_MAX_PAYLOAD_SIZE,
    LENGTH_PREFIX_SIZE,
};
