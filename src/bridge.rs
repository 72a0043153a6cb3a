//! Entry point for the request-interception layer.
//!
//! The [`RequestBridge`] turns one intercepted request into one backend
//! connection and always produces exactly one `(status, headers, body)` answer.
//! Relay failures of any kind (connect, write, framing, decode, timeout) are
//! logged and answered with the 500 fallback rather than returned as errors.
//!
//! # Example
//!
//! ```ignore
//! use socket_relay::{InterceptedRequest, RelayConfig, RequestBridge};
//!
//! let bridge = RequestBridge::new(RelayConfig::builder().socket_dir("run").build())?;
//! let request = InterceptedRequest::new("GET", "http://localhost:8080/index.html");
//! bridge
//!     .handle(request, |status, headers, body| {
//!         // hand status, headers and the body stream to the embedding shell
//!     })
//!     .await;
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tracing::Instrument;

use crate::config::RelayConfig;
use crate::connection::{RelayConnection, RelayResponse};
use crate::error::Result;
use crate::protocol::{HeaderValue, Headers, RequestRecord};
use crate::stream::BodyStream;
use crate::transport::Endpoint;

/// Referrer given to requests the host application makes on its own behalf.
pub const INTERNAL_REFERRER: &str = "http://localhost:8080";

/// A request as handed over by the interception layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterceptedRequest {
    pub url: String,
    pub method: String,
    pub headers: Headers,
    pub referrer: String,
    /// Upload data, if the request carried any.
    pub body: Option<Bytes>,
    /// Issued by the host application over IPC rather than by a page.
    pub ipc: bool,
}

impl InterceptedRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            ..Self::default()
        }
    }

    /// A request the host application sends through the relay itself: `GET`,
    /// no headers, [`INTERNAL_REFERRER`] as referrer.
    pub fn internal(url: impl Into<String>, body: Option<Bytes>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            referrer: INTERNAL_REFERRER.to_string(),
            body,
            ..Self::default()
        }
    }

    /// Add a header, replacing any previous value under the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = referrer.into();
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn ipc(mut self, ipc: bool) -> Self {
        self.ipc = ipc;
        self
    }

    /// Wire record for this request; an absent body encodes as zero bytes.
    pub fn to_record(&self) -> RequestRecord {
        let mut record = RequestRecord::new(
            self.url.clone(),
            self.method.clone(),
            self.headers.clone(),
            self.referrer.clone(),
            self.body.as_deref(),
        );
        record.ipc = self.ipc;
        record
    }
}

/// Relays intercepted requests to the backend socket.
///
/// Holds no per-request state; each call opens its own connection, so calls
/// may run concurrently.
#[derive(Debug, Clone)]
pub struct RequestBridge {
    endpoint: Endpoint,
    config: Arc<RelayConfig>,
}

impl RequestBridge {
    /// Resolve the endpoint and create its directory.
    pub fn new(config: RelayConfig) -> Result<Self> {
        let endpoint = config.endpoint()?;
        endpoint.ensure_dir()?;
        Ok(Self {
            endpoint,
            config: Arc::new(config),
        })
    }

    /// The backend endpoint this bridge connects to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Relay one request and call `respond` exactly once with the result.
    pub async fn handle<F, T>(&self, request: InterceptedRequest, respond: F) -> T
    where
        F: FnOnce(u16, Headers, BodyStream) -> T,
    {
        let response = self.relay(&request).await;
        respond(response.status_code, response.headers, response.body)
    }

    /// Relay one request and return the response triple.
    pub async fn relay(&self, request: &InterceptedRequest) -> RelayResponse {
        let span = tracing::debug_span!("relay", method = %request.method, url = %request.url);
        async {
            match self.try_relay(request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(error = %e, "relay failed, using fallback");
                    RelayResponse::fallback()
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn try_relay(&self, request: &InterceptedRequest) -> Result<RelayResponse> {
        let record = request.to_record();
        let mut connection = RelayConnection::open(&self.endpoint, self.config.clone()).await?;
        connection.send(&record).await?;
        Ok(connection.receive().await)
    }
}
