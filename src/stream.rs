//! Raw response body stream.
//!
//! After the response-header frame is parsed, the same connection carries the
//! body as unframed bytes until the backend closes it. The frame reader may
//! already have pulled some of those bytes off the socket; [`BodyStream`] puts
//! them back in front, so readers see the body exactly as it was sent.
//!
//! ```text
//! ┌────────────────┬───────────────────────────────┐
//! │ surplus bytes  │ socket read half ... EOF      │
//! └────────────────┴───────────────────────────────┘
//! ```

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::time::Sleep;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Response body: replayed surplus bytes, then the live connection.
pub struct BodyStream {
    prefix: Bytes,
    inner: Option<BoxedReader>,
    idle_timeout: Option<Duration>,
    idle: Option<Pin<Box<Sleep>>>,
}

impl BodyStream {
    /// A body with no bytes.
    pub fn empty() -> Self {
        Self {
            prefix: Bytes::new(),
            inner: None,
            idle_timeout: None,
            idle: None,
        }
    }

    /// A body made of `bytes` only.
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self {
            prefix: bytes,
            ..Self::empty()
        }
    }

    /// A body that yields `surplus` and then everything read from `inner`.
    pub fn new<R>(surplus: Bytes, inner: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            prefix: surplus,
            inner: Some(Box::new(inner)),
            idle_timeout: None,
            idle: None,
        }
    }

    /// Fail a read with `TimedOut` if the connection stays silent this long.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// True once every byte has been read.
    pub fn is_finished(&self) -> bool {
        self.prefix.is_empty() && self.inner.is_none()
    }

    /// Read the whole body into memory.
    pub async fn collect(mut self) -> io::Result<Bytes> {
        let mut out = Vec::with_capacity(self.prefix.len());
        self.read_to_end(&mut out).await?;
        Ok(Bytes::from(out))
    }
}

impl AsyncRead for BodyStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        if !this.prefix.is_empty() {
            let n = buf.remaining().min(this.prefix.len());
            buf.put_slice(&this.prefix.split_to(n));
            return Poll::Ready(Ok(()));
        }

        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(Ok(()));
        };

        let before = buf.filled().len();
        match Pin::new(inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                this.idle = None;
                if buf.filled().len() == before {
                    // EOF: release the connection.
                    this.inner = None;
                }
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => {
                this.idle = None;
                this.inner = None;
                Poll::Ready(Err(e))
            }
            Poll::Pending => {
                if let Some(timeout) = this.idle_timeout {
                    let sleep = this
                        .idle
                        .get_or_insert_with(|| Box::pin(tokio::time::sleep(timeout)));
                    if sleep.as_mut().poll(cx).is_ready() {
                        tracing::warn!(?timeout, "body stream idle, closing");
                        this.idle = None;
                        this.inner = None;
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "body read idle timeout",
                        )));
                    }
                }
                Poll::Pending
            }
        }
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyStream")
            .field("surplus", &self.prefix.len())
            .field("connected", &self.inner.is_some())
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

impl Default for BodyStream {
    fn default() -> Self {
        Self::empty()
    }
}
