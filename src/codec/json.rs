//! JSON codec using `serde_json`.
//!
//! Both relay records travel as compact UTF-8 JSON objects. The backend may be
//! written in any language, so field names are part of the wire format and
//! are fixed by the `serde` attributes on the record types.
//!
//! # Example
//!
//! ```
//! use socket_relay::codec::JsonCodec;
//! use socket_relay::protocol::ResponseHeaderRecord;
//!
//! let record = ResponseHeaderRecord::new(404, Default::default());
//! let encoded = JsonCodec::encode(&record).unwrap();
//! assert_eq!(&encoded[..], br#"{"statusCode":404,"headers":{}}"#);
//!
//! let decoded: ResponseHeaderRecord = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, record);
//! ```

use bytes::Bytes;

use crate::error::Result;
use crate::protocol::encode;

/// JSON codec for relay records.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to compact JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Decode JSON bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not valid UTF-8 JSON of type `T`.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encode a value and wrap it in a length-prefixed frame.
    pub fn encode_frame<T: serde::Serialize>(value: &T) -> Result<Bytes> {
        let payload = Self::encode(value)?;
        encode(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_length, Headers, RequestRecord, ResponseHeaderRecord};

    #[test]
    fn test_encode_request_record() {
        let record = RequestRecord::new("http://x/y", "GET", Headers::new(), "", None);
        let encoded = JsonCodec::encode(&record).unwrap();
        let text = std::str::from_utf8(&encoded).unwrap();

        assert!(text.contains(r#""url":"http://x/y""#));
        assert!(text.contains(r#""data":"""#));
        assert!(!text.contains("body_base64"));
    }

    #[test]
    fn test_encode_frame_prefixes_json() {
        let record = ResponseHeaderRecord::new(200, Headers::new());
        let frame = JsonCodec::encode_frame(&record).unwrap();

        let length = decode_length(&frame).unwrap() as usize;
        assert_eq!(length, frame.len() - 4);
        let decoded: ResponseHeaderRecord = JsonCodec::decode(&frame[4..]).unwrap();
        assert_eq!(decoded.status_code, 200);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: Result<ResponseHeaderRecord> = JsonCodec::decode(b"not json");
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_error_on_invalid_utf8() {
        let result: Result<ResponseHeaderRecord> = JsonCodec::decode(&[0xFF, 0xFE, b'{']);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let decoded: ResponseHeaderRecord =
            JsonCodec::decode(br#"{"statusCode":204,"headers":{},"extra":true}"#).unwrap();
        assert_eq!(decoded.status_code, 204);
    }
}
