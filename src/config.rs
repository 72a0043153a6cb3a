//! Relay configuration.
//!
//! Everything both sides of the relay need: where the backend socket lives,
//! how long each suspension point may take, and how much may be buffered.
//!
//! Use [`RelayConfig::builder`] in code, or deserialize it (durations in
//! milliseconds, every field optional) when it is part of a host application's
//! config file.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use socket_relay::RelayConfig;
//!
//! let config = RelayConfig::builder()
//!     .socket_dir("/tmp/myapp/run")
//!     .header_timeout(Duration::from_secs(10))
//!     .build();
//! assert_eq!(config.header_timeout, Duration::from_secs(10));
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;
use crate::transport::Endpoint;

/// Default socket directory, relative to the working directory.
pub const DEFAULT_SOCKET_DIR: &str = "run";

/// Default timeout for establishing the connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for writing the request frame.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for receiving the response-header frame.
pub const DEFAULT_HEADER_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for a single body read (or write, on the server).
pub const DEFAULT_BODY_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default maximum response-header frame payload (1 MiB).
pub const DEFAULT_MAX_HEADER_FRAME_SIZE: u32 = 1024 * 1024;

/// Default maximum request frame payload (64 MiB).
pub const DEFAULT_MAX_REQUEST_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Default maximum concurrent backend connections.
pub const DEFAULT_MAX_CONCURRENT_CONNECTIONS: usize = 256;

/// Configuration shared by [`RequestBridge`](crate::RequestBridge) and
/// [`RelayServer`](crate::RelayServer).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Directory holding the backend socket file.
    pub socket_dir: PathBuf,
    #[serde(rename = "connect_timeout_ms", with = "millis")]
    pub connect_timeout: Duration,
    #[serde(rename = "send_timeout_ms", with = "millis")]
    pub send_timeout: Duration,
    #[serde(rename = "header_timeout_ms", with = "millis")]
    pub header_timeout: Duration,
    #[serde(rename = "body_idle_timeout_ms", with = "millis")]
    pub body_idle_timeout: Duration,
    pub max_header_frame_size: u32,
    pub max_request_frame_size: u32,
    /// Bytes requested from the socket per read while parsing a frame.
    pub read_chunk_size: usize,
    /// Server only: connections handled at once.
    pub max_concurrent_connections: usize,
    /// Server only: remove an existing socket file instead of refusing to start.
    pub replace_stale_socket: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            socket_dir: PathBuf::from(DEFAULT_SOCKET_DIR),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            header_timeout: DEFAULT_HEADER_TIMEOUT,
            body_idle_timeout: DEFAULT_BODY_IDLE_TIMEOUT,
            max_header_frame_size: DEFAULT_MAX_HEADER_FRAME_SIZE,
            max_request_frame_size: DEFAULT_MAX_REQUEST_FRAME_SIZE,
            read_chunk_size: crate::protocol::DEFAULT_READ_CHUNK_SIZE,
            max_concurrent_connections: DEFAULT_MAX_CONCURRENT_CONNECTIONS,
            replace_stale_socket: false,
        }
    }
}

impl RelayConfig {
    /// Start a builder with default settings.
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder::new()
    }

    /// Resolve the backend endpoint inside `socket_dir`.
    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::in_dir(&self.socket_dir)
    }
}

/// Fluent builder for [`RelayConfig`].
#[derive(Debug, Clone, Default)]
pub struct RelayConfigBuilder {
    config: RelayConfig,
}

impl RelayConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the directory holding the backend socket.
    pub fn socket_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.socket_dir = dir.into();
        self
    }

    /// Default: 5 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Default: 5 seconds
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.config.send_timeout = timeout;
        self
    }

    /// Default: 30 seconds
    pub fn header_timeout(mut self, timeout: Duration) -> Self {
        self.config.header_timeout = timeout;
        self
    }

    /// Default: 60 seconds
    pub fn body_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.body_idle_timeout = timeout;
        self
    }

    /// Default: 1 MiB
    pub fn max_header_frame_size(mut self, size: u32) -> Self {
        self.config.max_header_frame_size = size;
        self
    }

    /// Default: 64 MiB
    pub fn max_request_frame_size(mut self, size: u32) -> Self {
        self.config.max_request_frame_size = size;
        self
    }

    /// Default: 16 KiB
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.config.read_chunk_size = size;
        self
    }

    /// Default: 256
    pub fn max_concurrent_connections(mut self, limit: usize) -> Self {
        self.config.max_concurrent_connections = limit;
        self
    }

    pub fn replace_stale_socket(mut self, replace: bool) -> Self {
        self.config.replace_stale_socket = replace;
        self
    }

    pub fn build(self) -> RelayConfig {
        self.config
    }
}

/// Serde adapter for durations expressed as integer milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
