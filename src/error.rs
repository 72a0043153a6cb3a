//! Error types for socket-relay.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for all relay operations.
#[derive(Debug, Error)]
pub enum RelayError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record payload did not parse as the expected JSON structure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request body was not valid base64.
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Length prefix had the sign bit set.
    #[error("Negative frame length: {0}")]
    NegativeLength(i32),

    /// Frame length exceeds the configured (or representable) maximum.
    #[error("Frame length {length} exceeds maximum {max}")]
    FrameTooLarge { length: u64, max: u64 },

    /// Stream ended before a complete frame was buffered.
    #[error("Stream ended mid-frame: needed {needed} bytes, had {available}")]
    Truncated { needed: usize, available: usize },

    /// Frame reader was asked for a second frame.
    #[error("Frame reader already finished")]
    ReaderFinished,

    /// Connection operation called out of order.
    #[error("Invalid connection state: expected {expected}, was {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A suspension point did not complete in time.
    #[error("Timed out during {phase}")]
    Timeout { phase: &'static str },

    /// Socket path cannot be used as a Unix socket address.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Socket file already exists (another server is running).
    #[error("Endpoint already in use: {}", .0.display())]
    EndpointInUse(PathBuf),
}

impl RelayError {
    /// True for errors caused by malformed framing or record content, as opposed
    /// to transport failures.
    pub fn is_bad_input(&self) -> bool {
        matches!(
            self,
            RelayError::Json(_)
                | RelayError::Base64(_)
                | RelayError::NegativeLength(_)
                | RelayError::FrameTooLarge { .. }
                | RelayError::Truncated { .. }
        )
    }
}

/// Result type alias using RelayError.
pub type Result<T> = std::result::Result<T, RelayError>;
