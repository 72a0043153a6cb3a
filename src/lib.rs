//! # socket-relay
//!
//! Relays intercepted HTTP-style requests to a backend process over a local
//! Unix domain socket, and streams the backend's response back.
//!
//! ## Protocol
//!
//! One connection per request:
//!
//! - **Request** (client → backend): one length-prefixed frame holding a JSON
//!   record `{url, headers, referrer, method, data}` with the body in base64,
//!   then the client closes its write half
//! - **Response header** (backend → client): one length-prefixed frame holding
//!   `{statusCode, headers}`
//! - **Response body**: raw bytes after the header frame until the backend
//!   closes the connection
//!
//! Frames are a 4-byte big-endian length followed by the payload.
//!
//! ## Example
//!
//! ```ignore
//! use socket_relay::{InterceptedRequest, RelayConfig, RequestBridge};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bridge = RequestBridge::new(RelayConfig::builder().socket_dir("run").build())?;
//!
//!     let response = bridge
//!         .relay(&InterceptedRequest::new("GET", "http://localhost:8080/"))
//!         .await;
//!     println!("{} {:?}", response.status_code, response.headers);
//!     let body = response.body.collect().await?;
//!     println!("{} bytes", body.len());
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod stream;
pub mod transport;

mod bridge;
mod connection;

pub use bridge::{InterceptedRequest, RequestBridge, INTERNAL_REFERRER};
pub use config::{RelayConfig, RelayConfigBuilder};
pub use connection::{ConnectionState, RelayConnection, RelayResponse, FALLBACK_STATUS};
pub use error::{RelayError, Result};
pub use protocol::{HeaderValue, Headers};
pub use server::{BackendRequest, BackendResponse, RelayServer, ResponseBody};
pub use stream::BodyStream;
