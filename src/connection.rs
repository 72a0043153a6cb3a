//! One backend connection per relayed request.
//!
//! Lifecycle:
//! ```text
//! Connecting ──send──► AwaitResponseHeader ──header──► StreamingBody ──body_stream──► Closed
//!      └───────────────────────┴──────────────────────────┴──► Failed
//! ```
//!
//! The socket is split into independent halves. After the request frame is
//! written the write half is shut down (the backend sees end of input) while
//! the read half stays open for the response.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

use crate::codec::JsonCodec;
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::protocol::{FrameReader, HeaderValue, Headers, RequestRecord, ResponseHeaderRecord};
use crate::stream::BodyStream;
use crate::transport::Endpoint;

/// Status code reported when the relay itself fails.
pub const FALLBACK_STATUS: u16 = 500;

const REDIRECT_STATUS: u16 = 302;
const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Where a [`RelayConnection`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected; the request has not been written yet.
    Connecting,
    /// Request written, write half closed, waiting for the header frame.
    AwaitResponseHeader,
    /// Header received; the read half now carries the raw body.
    StreamingBody,
    /// Body handed off to the caller.
    Closed,
    /// A phase failed; the socket has been released.
    Failed,
}

impl ConnectionState {
    fn name(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::AwaitResponseHeader => "AwaitResponseHeader",
            ConnectionState::StreamingBody => "StreamingBody",
            ConnectionState::Closed => "Closed",
            ConnectionState::Failed => "Failed",
        }
    }
}

/// The `(status, headers, body)` triple handed back to the interception layer.
#[derive(Debug)]
pub struct RelayResponse {
    pub status_code: u16,
    pub headers: Headers,
    pub body: BodyStream,
}

impl RelayResponse {
    /// The synthetic response used for every relay failure: 500, no headers,
    /// no body.
    pub fn fallback() -> Self {
        Self {
            status_code: FALLBACK_STATUS,
            headers: Headers::new(),
            body: BodyStream::empty(),
        }
    }

    /// A `302` to `location` with an empty body, answered without the backend.
    pub fn redirect(location: impl Into<String>) -> Self {
        let mut headers = Headers::new();
        headers.insert("Location".to_string(), HeaderValue::Single(location.into()));
        Self {
            status_code: REDIRECT_STATUS,
            headers,
            body: BodyStream::empty(),
        }
    }

    /// A `200` serving `body` as `application/pdf`.
    pub fn pdf(body: BodyStream) -> Self {
        let mut headers = Headers::new();
        headers.insert(
            "Content-Type".to_string(),
            HeaderValue::Single(PDF_CONTENT_TYPE.to_string()),
        );
        Self {
            status_code: 200,
            headers,
            body,
        }
    }
}

/// A single-use connection to the backend.
pub struct RelayConnection {
    state: ConnectionState,
    reader: Option<OwnedReadHalf>,
    writer: Option<OwnedWriteHalf>,
    /// Body bytes read while parsing the header frame.
    surplus: Bytes,
    config: Arc<RelayConfig>,
}

impl RelayConnection {
    /// Connect to the backend.
    ///
    /// Completes once the socket is connected and writable; there is no fixed
    /// settling delay.
    pub async fn open(endpoint: &Endpoint, config: Arc<RelayConfig>) -> Result<Self> {
        let stream = timeout(config.connect_timeout, endpoint.connect())
            .await
            .map_err(|_| RelayError::Timeout { phase: "connect" })??;
        tracing::debug!(path = %endpoint.path().display(), "connected to backend");

        let (reader, writer) = stream.into_split();
        Ok(Self {
            state: ConnectionState::Connecting,
            reader: Some(reader),
            writer: Some(writer),
            surplus: Bytes::new(),
            config,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn expect_state(&self, expected: ConnectionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(RelayError::InvalidState {
                expected: expected.name(),
                actual: self.state.name(),
            })
        }
    }

    fn fail(&mut self) {
        self.state = ConnectionState::Failed;
        self.reader = None;
        self.writer = None;
        self.surplus = Bytes::new();
    }

    /// Write the request frame, then close the write half.
    pub async fn send(&mut self, record: &RequestRecord) -> Result<()> {
        self.expect_state(ConnectionState::Connecting)?;
        let frame = JsonCodec::encode_frame(record)?;
        let Some(mut writer) = self.writer.take() else {
            self.fail();
            return Err(RelayError::ConnectionClosed);
        };

        let written = timeout(self.config.send_timeout, async {
            writer.write_all(&frame).await?;
            writer.shutdown().await
        })
        .await;

        match written {
            Ok(Ok(())) => {
                tracing::debug!(bytes = frame.len(), "request frame sent");
                self.state = ConnectionState::AwaitResponseHeader;
                Ok(())
            }
            Ok(Err(e)) => {
                self.fail();
                Err(RelayError::Io(e))
            }
            Err(_) => {
                self.fail();
                Err(RelayError::Timeout { phase: "send" })
            }
        }
    }

    /// Read and decode the response-header frame.
    ///
    /// Bytes read past the frame are kept for [`body_stream`](Self::body_stream).
    pub async fn await_response_header(&mut self) -> Result<ResponseHeaderRecord> {
        self.expect_state(ConnectionState::AwaitResponseHeader)?;
        let Some(reader) = self.reader.as_mut() else {
            self.fail();
            return Err(RelayError::ConnectionClosed);
        };

        let mut frame_reader = FrameReader::with_max_payload(self.config.max_header_frame_size)
            .read_chunk_size(self.config.read_chunk_size);
        let read = timeout(self.config.header_timeout, frame_reader.read_frame(reader)).await;
        let surplus = frame_reader.unconsume();

        let header = match read {
            Ok(Ok(payload)) => JsonCodec::decode::<ResponseHeaderRecord>(&payload),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RelayError::Timeout {
                phase: "response header",
            }),
        };

        match header {
            Ok(header) => {
                tracing::debug!(
                    status = header.status_code,
                    surplus = surplus.len(),
                    "response header received"
                );
                self.surplus = surplus;
                self.state = ConnectionState::StreamingBody;
                Ok(header)
            }
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    /// Hand the raw connection to the caller as the response body.
    ///
    /// Yields the surplus bytes first, then reads the socket until the backend
    /// closes it. Outside `StreamingBody` this returns an empty body.
    pub fn body_stream(&mut self) -> BodyStream {
        if self.state != ConnectionState::StreamingBody {
            return BodyStream::empty();
        }
        self.state = ConnectionState::Closed;
        let surplus = std::mem::take(&mut self.surplus);
        match self.reader.take() {
            Some(reader) => {
                BodyStream::new(surplus, reader).idle_timeout(self.config.body_idle_timeout)
            }
            None => BodyStream::from_bytes(surplus),
        }
    }

    /// Await the header and build the response, substituting the fallback on
    /// any failure.
    pub async fn receive(mut self) -> RelayResponse {
        match self.await_response_header().await {
            Ok(header) => RelayResponse {
                status_code: header.status_code,
                headers: header.headers,
                body: self.body_stream(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "no usable response header, using fallback");
                RelayResponse::fallback()
            }
        }
    }
}
