//! Single-frame reader with backpressure.
//!
//! A [`FrameReader`] accumulates arbitrarily-sized chunks until it holds one
//! complete frame, hands out that frame's payload exactly once, and then gives
//! back whatever it buffered beyond the frame so the same stream can be read
//! raw afterwards.
//!
//! States:
//! - `Idle`: need 4 bytes for the length prefix
//! - `AwaitPayload`: length known, need that many payload bytes
//! - `Delivered`: payload handed out (terminal)
//! - `Failed`: bad length or stream ended mid-frame (terminal)
//!
//! The transition functions ([`push`](FrameReader::push),
//! [`finish`](FrameReader::finish)) are pure and socket-free. The async adapter
//! [`read_frame`](FrameReader::read_frame) only reads from the stream while the
//! reader [wants input](FrameReader::wants_input), so at most one read chunk is
//! ever buffered ahead of need.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use socket_relay::protocol::{encode, FrameReader, Progress};
//!
//! let frame = encode(b"header").unwrap();
//! let mut reader = FrameReader::new();
//!
//! assert!(matches!(reader.push(frame.slice(..3)), Progress::Pending));
//! let mut rest = frame.slice(3..).to_vec();
//! rest.extend_from_slice(b"body");
//! match reader.push(Bytes::from(rest)) {
//!     Progress::Frame(payload) => assert_eq!(&payload[..], b"header"),
//!     other => panic!("unexpected {:?}", other),
//! }
//! assert_eq!(&reader.unconsume()[..], b"body");
//! ```

use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::wire_format::{validate_length, LENGTH_PREFIX_SIZE};
use crate::error::{RelayError, Result};

/// Default number of bytes requested from the stream per read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 16 * 1024;

/// Parsing state of a [`FrameReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Waiting for the 4-byte length prefix.
    Idle,
    /// Length parsed, waiting for `length` payload bytes.
    AwaitPayload { length: u32 },
    /// Payload delivered.
    Delivered,
    /// Framing failed; no payload will be delivered.
    Failed,
}

impl ReaderState {
    /// True once the reader has reported its outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReaderState::Delivered | ReaderState::Failed)
    }
}

/// Outcome of feeding the reader.
#[derive(Debug)]
pub enum Progress {
    /// Not enough bytes yet. The transport should stay paused until more are
    /// requested.
    Pending,
    /// The frame payload. Produced once.
    Frame(Bytes),
    /// Framing failed. Produced once.
    Failed(RelayError),
    /// The outcome was already reported.
    Done,
}

/// Incremental one-frame reader.
pub struct FrameReader {
    /// Received chunks in arrival order; the front one may be partially consumed.
    chunks: VecDeque<Bytes>,
    /// Buffered bytes not yet consumed.
    available: usize,
    state: ReaderState,
    max_payload_size: Option<u32>,
    read_chunk_size: usize,
}

impl FrameReader {
    /// Create a reader with no payload limit beyond the sign rule.
    pub fn new() -> Self {
        Self {
            chunks: VecDeque::new(),
            available: 0,
            state: ReaderState::Idle,
            max_payload_size: None,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }

    /// Create a reader that fails on frames longer than `max_payload_size`.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            max_payload_size: Some(max_payload_size),
            ..Self::new()
        }
    }

    /// Set how many bytes [`read_frame`](Self::read_frame) requests per read.
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Current state.
    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Number of buffered, unconsumed bytes.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.available
    }

    /// Bytes the current state needs before it can advance.
    fn needed(&self) -> usize {
        match self.state {
            ReaderState::Idle => LENGTH_PREFIX_SIZE,
            ReaderState::AwaitPayload { length } => length as usize,
            ReaderState::Delivered | ReaderState::Failed => 0,
        }
    }

    /// True while the reader cannot advance without more input.
    ///
    /// This is the resume signal: the stream should only be read while it holds.
    pub fn wants_input(&self) -> bool {
        !self.state.is_terminal() && self.available < self.needed()
    }

    /// Feed one chunk and advance as far as possible.
    ///
    /// Once the reader is terminal, chunks are only kept as surplus.
    pub fn push(&mut self, chunk: Bytes) -> Progress {
        if !chunk.is_empty() {
            self.available += chunk.len();
            self.chunks.push_back(chunk);
        }
        self.advance()
    }

    /// Signal end of stream.
    ///
    /// A frame that is still incomplete fails; there is no partial delivery.
    pub fn finish(&mut self) -> Progress {
        match self.advance() {
            Progress::Pending => {
                let needed = self.needed();
                let available = self.available;
                self.state = ReaderState::Failed;
                Progress::Failed(RelayError::Truncated { needed, available })
            }
            other => other,
        }
    }

    fn advance(&mut self) -> Progress {
        loop {
            match self.state {
                ReaderState::Idle => {
                    let Some(mut prefix) = self.consume(LENGTH_PREFIX_SIZE) else {
                        return Progress::Pending;
                    };
                    let raw = prefix.get_i32();
                    match validate_length(raw, self.max_payload_size) {
                        Ok(length) => {
                            tracing::trace!(length, "frame length decoded");
                            self.state = ReaderState::AwaitPayload { length };
                        }
                        Err(e) => {
                            self.state = ReaderState::Failed;
                            return Progress::Failed(e);
                        }
                    }
                }
                ReaderState::AwaitPayload { length } => {
                    let Some(payload) = self.consume(length as usize) else {
                        return Progress::Pending;
                    };
                    self.state = ReaderState::Delivered;
                    return Progress::Frame(payload);
                }
                ReaderState::Delivered | ReaderState::Failed => return Progress::Done,
            }
        }
    }

    /// Take exactly `size` bytes off the front, or nothing if not enough are
    /// buffered.
    fn consume(&mut self, size: usize) -> Option<Bytes> {
        if size > self.available {
            return None;
        }
        self.available -= size;
        if size == 0 {
            return Some(Bytes::new());
        }

        // Fast path: the front chunk alone covers the request.
        if let Some(front) = self.chunks.front_mut() {
            if front.len() >= size {
                let out = front.split_to(size);
                if front.is_empty() {
                    self.chunks.pop_front();
                }
                return Some(out);
            }
        }

        let mut out = BytesMut::with_capacity(size);
        let mut remaining = size;
        while remaining > 0 {
            let Some(mut chunk) = self.chunks.pop_front() else {
                break;
            };
            if chunk.len() <= remaining {
                remaining -= chunk.len();
                out.extend_from_slice(&chunk);
            } else {
                out.extend_from_slice(&chunk.split_to(remaining));
                remaining = 0;
                self.chunks.push_front(chunk);
            }
        }
        Some(out.freeze())
    }

    /// Return every buffered-but-unconsumed byte, in arrival order, and reset
    /// the reader to `Idle`.
    ///
    /// The caller puts these bytes back in front of the stream they came from.
    pub fn unconsume(&mut self) -> Bytes {
        let surplus = match self.chunks.len() {
            0 => Bytes::new(),
            1 => self.chunks.pop_front().unwrap_or_default(),
            _ => {
                let mut joined = BytesMut::with_capacity(self.available);
                for chunk in self.chunks.drain(..) {
                    joined.extend_from_slice(&chunk);
                }
                joined.freeze()
            }
        };
        self.chunks.clear();
        self.available = 0;
        self.state = ReaderState::Idle;
        surplus
    }

    /// Read one frame from `io`.
    ///
    /// Reads at most one chunk at a time and only while the reader needs more
    /// bytes. Bytes read past the frame stay buffered for
    /// [`unconsume`](Self::unconsume).
    pub async fn read_frame<R>(&mut self, io: &mut R) -> Result<Bytes>
    where
        R: AsyncRead + Unpin,
    {
        let mut progress = self.advance();
        loop {
            match progress {
                Progress::Frame(payload) => return Ok(payload),
                Progress::Failed(e) => return Err(e),
                Progress::Done => return Err(RelayError::ReaderFinished),
                Progress::Pending => {
                    tracing::trace!(
                        buffered = self.available,
                        needed = self.needed(),
                        "resuming read"
                    );
                    let mut buf = BytesMut::with_capacity(self.read_chunk_size);
                    let n = match io.read_buf(&mut buf).await {
                        Ok(n) => n,
                        Err(e) => {
                            self.state = ReaderState::Failed;
                            return Err(RelayError::Io(e));
                        }
                    };
                    progress = if n == 0 {
                        self.finish()
                    } else {
                        self.push(buf.freeze())
                    };
                }
            }
        }
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode;

    fn frame_with_surplus(payload: &[u8], surplus: &[u8]) -> Vec<u8> {
        let mut bytes = encode(payload).unwrap().to_vec();
        bytes.extend_from_slice(surplus);
        bytes
    }

    fn expect_frame(progress: Progress) -> Bytes {
        match progress {
            Progress::Frame(payload) => payload,
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_single_chunk() {
        let mut reader = FrameReader::new();
        let payload = expect_frame(reader.push(encode(b"hello").unwrap()));

        assert_eq!(&payload[..], b"hello");
        assert_eq!(reader.state(), ReaderState::Delivered);
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn test_every_two_way_split_yields_same_payload() {
        let bytes = encode(b"split me anywhere").unwrap();
        for cut in 1..bytes.len() {
            let mut reader = FrameReader::new();
            assert!(matches!(reader.push(bytes.slice(..cut)), Progress::Pending));
            let payload = expect_frame(reader.push(bytes.slice(cut..)));
            assert_eq!(&payload[..], b"split me anywhere", "cut at {}", cut);
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let bytes = encode(b"hi there").unwrap();
        let mut reader = FrameReader::new();
        let mut delivered = None;

        for i in 0..bytes.len() {
            match reader.push(bytes.slice(i..i + 1)) {
                Progress::Pending => assert!(reader.wants_input()),
                Progress::Frame(payload) => delivered = Some(payload),
                other => panic!("unexpected {:?}", other),
            }
        }

        assert_eq!(&delivered.unwrap()[..], b"hi there");
        assert!(!reader.wants_input());
    }

    #[test]
    fn test_state_transitions() {
        let bytes = encode(b"abcdef").unwrap();
        let mut reader = FrameReader::new();
        assert_eq!(reader.state(), ReaderState::Idle);

        reader.push(bytes.slice(..2));
        assert_eq!(reader.state(), ReaderState::Idle);
        assert_eq!(reader.buffered(), 2);

        reader.push(bytes.slice(2..6));
        assert_eq!(reader.state(), ReaderState::AwaitPayload { length: 6 });
        assert_eq!(reader.buffered(), 2);

        expect_frame(reader.push(bytes.slice(6..)));
        assert_eq!(reader.state(), ReaderState::Delivered);
    }

    #[test]
    fn test_zero_length_frame() {
        let mut reader = FrameReader::new();
        let payload = expect_frame(reader.push(Bytes::from_static(&[0, 0, 0, 0])));
        assert!(payload.is_empty());
    }

    #[test]
    fn test_surplus_in_same_chunk() {
        let mut reader = FrameReader::new();
        let bytes = frame_with_surplus(b"head", b"body bytes");

        expect_frame(reader.push(Bytes::from(bytes)));
        assert_eq!(reader.buffered(), 10);
        assert_eq!(&reader.unconsume()[..], b"body bytes");
    }

    #[test]
    fn test_surplus_across_chunks_keeps_order() {
        let mut reader = FrameReader::new();
        let bytes = Bytes::from(frame_with_surplus(b"hd", b"0123456789"));

        // Frame ends inside the second chunk; surplus spans three chunks.
        assert!(matches!(reader.push(bytes.slice(..5)), Progress::Pending));
        expect_frame(reader.push(bytes.slice(5..9)));
        assert!(matches!(reader.push(bytes.slice(9..12)), Progress::Done));
        assert!(matches!(reader.push(bytes.slice(12..)), Progress::Done));

        assert_eq!(&reader.unconsume()[..], b"0123456789");
    }

    #[test]
    fn test_prefix_and_payload_gathered_from_many_chunks() {
        let mut reader = FrameReader::new();

        // Prefix spans two chunks; payload spans three, the last one split.
        for chunk in [&[0u8, 0][..], &[0, 5, b'h'][..], &b"el"[..]] {
            assert!(matches!(
                reader.push(Bytes::copy_from_slice(chunk)),
                Progress::Pending
            ));
        }
        let payload = expect_frame(reader.push(Bytes::from_static(b"lo-rest")));

        assert_eq!(&payload[..], b"hello");
        assert_eq!(&reader.unconsume()[..], b"-rest");
    }

    #[test]
    fn test_unconsume_resets() {
        let mut reader = FrameReader::new();
        expect_frame(reader.push(Bytes::from(frame_with_surplus(b"a", b"xyz"))));

        let surplus = reader.unconsume();
        assert_eq!(&surplus[..], b"xyz");
        assert_eq!(reader.state(), ReaderState::Idle);
        assert_eq!(reader.buffered(), 0);
        assert!(reader.unconsume().is_empty());
    }

    #[test]
    fn test_negative_length_fails() {
        let mut reader = FrameReader::new();
        let progress = reader.push(Bytes::from_static(&[0xFF, 0xFF, 0xFF, 0xFF, 1, 2]));

        assert!(matches!(
            progress,
            Progress::Failed(RelayError::NegativeLength(-1))
        ));
        assert_eq!(reader.state(), ReaderState::Failed);
        assert!(!reader.wants_input());
        // Bytes after the bad prefix are still handed back.
        assert_eq!(&reader.unconsume()[..], &[1, 2]);
    }

    #[test]
    fn test_high_bit_set_fails_before_payload() {
        let mut reader = FrameReader::new();
        let progress = reader.push(Bytes::from_static(&[0x80, 0, 0, 1]));
        assert!(matches!(progress, Progress::Failed(_)));
    }

    #[test]
    fn test_max_payload_validation() {
        let mut reader = FrameReader::with_max_payload(100);
        let progress = reader.push(Bytes::from_static(&[0, 0, 0x03, 0xE8]));

        match progress {
            Progress::Failed(e) => assert!(e.to_string().contains("exceeds maximum")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_finish_mid_prefix_fails() {
        let mut reader = FrameReader::new();
        reader.push(Bytes::from_static(&[0, 0]));

        match reader.finish() {
            Progress::Failed(RelayError::Truncated { needed, available }) => {
                assert_eq!(needed, 4);
                assert_eq!(available, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_finish_mid_payload_fails() {
        let bytes = encode(b"incomplete").unwrap();
        let mut reader = FrameReader::new();
        reader.push(bytes.slice(..8));

        assert!(matches!(
            reader.finish(),
            Progress::Failed(RelayError::Truncated { .. })
        ));
        assert_eq!(reader.state(), ReaderState::Failed);
    }

    #[test]
    fn test_finish_with_nothing_fails() {
        let mut reader = FrameReader::new();
        assert!(matches!(reader.finish(), Progress::Failed(_)));
    }

    #[test]
    fn test_outcome_reported_once() {
        let mut reader = FrameReader::new();
        expect_frame(reader.push(encode(b"once").unwrap()));
        assert!(matches!(reader.push(encode(b"twice").unwrap()), Progress::Done));
        assert!(matches!(reader.finish(), Progress::Done));
    }

    #[tokio::test]
    async fn test_read_frame_leaves_rest_of_stream_unread() {
        let bytes = frame_with_surplus(b"header", &[9u8; 100]);
        let mut io: &[u8] = &bytes;
        let mut reader = FrameReader::new().read_chunk_size(4);

        let payload = reader.read_frame(&mut io).await.unwrap();
        assert_eq!(&payload[..], b"header");

        // Reads stop at the first chunk that completes the frame.
        let surplus = reader.unconsume();
        assert!(surplus.len() < 4);
        let mut rest = surplus.to_vec();
        rest.extend_from_slice(io);
        assert_eq!(rest, vec![9u8; 100]);
    }

    #[tokio::test]
    async fn test_read_frame_truncated_stream() {
        let bytes = encode(b"cut short").unwrap();
        let mut io: &[u8] = &bytes[..7];
        let mut reader = FrameReader::new();

        let err = reader.read_frame(&mut io).await.unwrap_err();
        assert!(matches!(err, RelayError::Truncated { .. }));
    }

    #[tokio::test]
    async fn test_read_frame_huge_prefix_does_not_read_on() {
        let mut bytes = vec![0xFF, 0xFF, 0xFF, 0xFF];
        bytes.extend_from_slice(&[0u8; 64]);
        let mut io: &[u8] = &bytes;
        let mut reader = FrameReader::new().read_chunk_size(4);

        let err = reader.read_frame(&mut io).await.unwrap_err();
        assert!(matches!(err, RelayError::NegativeLength(-1)));
        assert_eq!(io.len(), 64);
    }

    #[tokio::test]
    async fn test_read_frame_over_duplex_chunks() {
        use tokio::io::AsyncWriteExt;

        let (mut tx, mut rx) = tokio::io::duplex(8);
        let bytes = frame_with_surplus(b"streamed header payload", b"tail");

        let writer = tokio::spawn(async move {
            for chunk in bytes.chunks(3) {
                tx.write_all(chunk).await.unwrap();
            }
        });

        let mut reader = FrameReader::new();
        let payload = reader.read_frame(&mut rx).await.unwrap();
        assert_eq!(&payload[..], b"streamed header payload");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_frame_twice_errors() {
        let bytes = encode(b"x").unwrap();
        let mut io: &[u8] = &bytes;
        let mut reader = FrameReader::new();
        reader.read_frame(&mut io).await.unwrap();

        let err = reader.read_frame(&mut io).await.unwrap_err();
        assert!(matches!(err, RelayError::ReaderFinished));
    }
}
