//! Records carried in the request and response-header frames.
//!
//! Both are JSON objects on the wire:
//!
//! ```text
//! request:  {"url": .., "headers": {..}, "referrer": .., "method": .., "data": "<base64>"}
//! response: {"statusCode": 200, "headers": {..}}
//! ```
//!
//! Requests that originate from the host application itself also carry
//! `"ipc": true`; the key is omitted otherwise.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A header value: one string, or several for repeated headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Single(String),
    Multiple(Vec<String>),
}

impl HeaderValue {
    /// All values, in order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            HeaderValue::Single(v) => vec![v.as_str()],
            HeaderValue::Multiple(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    /// The first value, if any.
    pub fn first(&self) -> Option<&str> {
        match self {
            HeaderValue::Single(v) => Some(v.as_str()),
            HeaderValue::Multiple(vs) => vs.first().map(String::as_str),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Single(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Single(value)
    }
}

impl From<Vec<String>> for HeaderValue {
    fn from(values: Vec<String>) -> Self {
        HeaderValue::Multiple(values)
    }
}

/// Header map as carried on the wire.
pub type Headers = BTreeMap<String, HeaderValue>;

/// Payload of the single outbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub url: String,
    pub headers: Headers,
    pub referrer: String,
    pub method: String,
    /// Request body, base64-encoded. Empty for no body.
    #[serde(rename = "data")]
    pub body_base64: String,
    /// Set for requests issued by the host application rather than a page.
    #[serde(default, skip_serializing_if = "is_false")]
    pub ipc: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl RequestRecord {
    /// Build a record, encoding `body` as base64. `None` encodes as zero bytes.
    pub fn new(
        url: impl Into<String>,
        method: impl Into<String>,
        headers: Headers,
        referrer: impl Into<String>,
        body: Option<&[u8]>,
    ) -> Self {
        Self {
            url: url.into(),
            headers,
            referrer: referrer.into(),
            method: method.into(),
            body_base64: STANDARD.encode(body.unwrap_or_default()),
            ipc: false,
        }
    }

    /// Decode the body bytes.
    pub fn body(&self) -> Result<Bytes> {
        Ok(Bytes::from(STANDARD.decode(&self.body_base64)?))
    }
}

/// Payload of the single inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseHeaderRecord {
    pub status_code: u16,
    #[serde(default)]
    pub headers: Headers,
}

impl ResponseHeaderRecord {
    pub fn new(status_code: u16, headers: Headers) -> Self {
        Self {
            status_code,
            headers,
        }
    }
}
