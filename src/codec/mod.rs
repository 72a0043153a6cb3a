//! Codec module - serialization/deserialization for frame payloads.
//!
//! The relay protocol carries exactly two kinds of structured payload, the
//! request record and the response-header record, both as JSON via
//! [`JsonCodec`]. Response bodies are never encoded; they follow the header
//! frame as raw bytes.

mod json;

pub use json::JsonCodec;
