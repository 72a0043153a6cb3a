//! Backend side of the relay protocol.
//!
//! The [`RelayServer`] listens on the endpoint socket and, for every accepted
//! connection:
//! 1. Reads one request frame (the client closes its write half after it)
//! 2. Decodes the request record and its base64 body
//! 3. Calls the handler
//! 4. Writes one response-header frame, then the raw body, then closes
//!
//! Malformed requests get a `400` header and no body.
//!
//! # Example
//!
//! ```ignore
//! use socket_relay::{BackendResponse, RelayConfig, RelayServer};
//!
//! let server = RelayServer::bind(RelayConfig::builder().socket_dir("run").build()).await?;
//! server
//!     .serve(|request| async move {
//!         BackendResponse::new(200)
//!             .header("Content-Type", "text/plain")
//!             .body_bytes(format!("you asked for {}", request.url))
//!     })
//!     .await?;
//! ```

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::codec::JsonCodec;
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::protocol::{FrameReader, HeaderValue, Headers, RequestRecord, ResponseHeaderRecord};
use crate::transport::RelayListener;

/// Status sent for requests that cannot be decoded.
pub const BAD_REQUEST_STATUS: u16 = 400;

/// Pause after a failed accept before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Body copy buffer size.
const COPY_BUFFER_SIZE: usize = 16 * 1024;

/// A decoded request as seen by the backend handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRequest {
    pub url: String,
    pub method: String,
    pub headers: Headers,
    pub referrer: String,
    pub body: Bytes,
    /// Sent by the host application rather than a page.
    pub ipc: bool,
}

impl BackendRequest {
    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.first())
    }
}

impl TryFrom<RequestRecord> for BackendRequest {
    type Error = RelayError;

    fn try_from(record: RequestRecord) -> Result<Self> {
        let body = record.body()?;
        Ok(Self {
            url: record.url,
            method: record.method,
            headers: record.headers,
            referrer: record.referrer,
            body,
            ipc: record.ipc,
        })
    }
}

/// Body written after the response-header frame.
pub enum ResponseBody {
    Empty,
    Bytes(Bytes),
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Empty => f.write_str("Empty"),
            ResponseBody::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            ResponseBody::Reader(_) => f.write_str("Reader"),
        }
    }
}

/// What a handler returns.
#[derive(Debug)]
pub struct BackendResponse {
    pub status_code: u16,
    pub headers: Headers,
    pub body: ResponseBody,
}

impl BackendResponse {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: Headers::new(),
            body: ResponseBody::Empty,
        }
    }

    pub fn bad_request() -> Self {
        Self::new(BAD_REQUEST_STATUS)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = ResponseBody::Bytes(body.into());
        self
    }

    /// Stream the body from `reader` until it ends.
    pub fn body_reader<R>(mut self, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.body = ResponseBody::Reader(Box::new(reader));
        self
    }
}

/// Listening backend.
pub struct RelayServer {
    listener: RelayListener,
    config: Arc<RelayConfig>,
    semaphore: Arc<Semaphore>,
}

impl RelayServer {
    /// Bind the endpoint described by `config`.
    pub async fn bind(config: RelayConfig) -> Result<Self> {
        let endpoint = config.endpoint()?;
        let listener = RelayListener::bind(&endpoint, config.replace_stale_socket).await?;
        tracing::info!(path = %endpoint.path().display(), "relay server listening");

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_connections.max(1)));
        Ok(Self {
            listener,
            config: Arc::new(config),
            semaphore,
        })
    }

    /// Socket file path.
    pub fn path(&self) -> &Path {
        self.listener.path()
    }

    /// Serve until the listener fails permanently.
    pub async fn serve<H, Fut>(self, handler: H) -> Result<()>
    where
        H: Fn(BackendRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BackendResponse> + Send + 'static,
    {
        self.serve_with_shutdown(handler, std::future::pending())
            .await
    }

    /// Serve until `shutdown` completes. Connections in flight keep running.
    ///
    /// The socket file is removed when this returns.
    pub async fn serve_with_shutdown<H, Fut, S>(self, handler: H, shutdown: S) -> Result<()>
    where
        H: Fn(BackendRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BackendResponse> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        tokio::pin!(shutdown);

        loop {
            // Over the limit, wait for a running connection to finish.
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = self.semaphore.clone().acquire_owned() => {
                    permit.map_err(|_| RelayError::ConnectionClosed)?
                }
            };

            let stream = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(stream) => stream,
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        continue;
                    }
                },
            };

            let handler = handler.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = serve_connection(stream, handler.as_ref(), &config).await {
                    tracing::warn!("Connection error: {}", e);
                }
            });
        }

        tracing::info!(path = %self.path().display(), "relay server stopped");
        Ok(())
    }
}

/// Handle one accepted connection: one request in, one response out.
pub async fn serve_connection<S, H, Fut>(
    stream: S,
    handler: &H,
    config: &RelayConfig,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: Fn(BackendRequest) -> Fut,
    Fut: Future<Output = BackendResponse>,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    let request = match read_request(&mut reader, config).await {
        Ok(request) => request,
        Err(e) if e.is_bad_input() => {
            tracing::warn!(error = %e, "bad request");
            write_response(&mut writer, BackendResponse::bad_request(), config).await?;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    tracing::debug!(method = %request.method, url = %request.url, "request received");
    let response = handler(request).await;
    write_response(&mut writer, response, config).await
}

async fn read_request<R>(reader: &mut R, config: &RelayConfig) -> Result<BackendRequest>
where
    R: AsyncRead + Unpin,
{
    let mut frame_reader = FrameReader::with_max_payload(config.max_request_frame_size)
        .read_chunk_size(config.read_chunk_size);
    let payload = timeout(config.header_timeout, frame_reader.read_frame(reader))
        .await
        .map_err(|_| RelayError::Timeout { phase: "request" })??;

    let trailing = frame_reader.unconsume();
    if !trailing.is_empty() {
        tracing::debug!(bytes = trailing.len(), "ignoring bytes after request frame");
    }

    let record: RequestRecord = JsonCodec::decode(&payload)?;
    BackendRequest::try_from(record)
}

async fn write_response<W>(
    writer: &mut W,
    response: BackendResponse,
    config: &RelayConfig,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let idle = config.body_idle_timeout;
    let header = ResponseHeaderRecord::new(response.status_code, response.headers);
    let frame = JsonCodec::encode_frame(&header)?;
    write_all_within(writer, &frame, idle).await?;

    match response.body {
        ResponseBody::Empty => {}
        ResponseBody::Bytes(bytes) => write_all_within(writer, &bytes, idle).await?,
        ResponseBody::Reader(mut source) => copy_body(&mut source, writer, idle).await?,
    }

    writer.shutdown().await?;
    Ok(())
}

async fn write_all_within<W>(writer: &mut W, bytes: &[u8], idle: Duration) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    timeout(idle, writer.write_all(bytes))
        .await
        .map_err(|_| RelayError::Timeout { phase: "body write" })??;
    Ok(())
}

/// Copy the body, aborting if the source or the peer stalls for `idle`.
async fn copy_body<R, W>(source: &mut R, writer: &mut W, idle: Duration) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(COPY_BUFFER_SIZE);
    let mut total = 0usize;
    loop {
        buf.clear();
        let n = timeout(idle, source.read_buf(&mut buf))
            .await
            .map_err(|_| RelayError::Timeout { phase: "body read" })??;
        if n == 0 {
            break;
        }
        write_all_within(writer, &buf, idle).await?;
        total += n;
    }
    tracing::debug!(bytes = total, "body sent");
    Ok(())
}
