//! Integration tests for socket-relay framing.
//!
//! These tests verify the integration between the codec, frame reader and
//! record types.

use bytes::Bytes;
use socket_relay::codec::JsonCodec;
use socket_relay::protocol::{
    decode_length, encode, FrameReader, Headers, Progress, RequestRecord, ResponseHeaderRecord,
    LENGTH_PREFIX_SIZE,
};

fn response_frame_with_body(body: &[u8]) -> Vec<u8> {
    let mut headers = Headers::new();
    headers.insert("Content-Type".to_string(), "text/plain".into());
    let mut bytes = JsonCodec::encode_frame(&ResponseHeaderRecord::new(200, headers))
        .unwrap()
        .to_vec();
    bytes.extend_from_slice(body);
    bytes
}

/// Deterministic pseudo-random chunk sizes in `1..=max`.
fn chunk_sizes(seed: u64, max: usize) -> impl Iterator<Item = usize> {
    let mut state = seed;
    std::iter::from_fn(move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        Some((state >> 33) as usize % max + 1)
    })
}

/// Test full frame encode/decode cycle with a JSON request record.
#[test]
fn test_frame_with_request_record() {
    let record = RequestRecord::new("http://x/y", "GET", Headers::new(), "", None);
    let frame = JsonCodec::encode_frame(&record).unwrap();

    assert_eq!(
        decode_length(&frame[..LENGTH_PREFIX_SIZE]),
        Some((frame.len() - LENGTH_PREFIX_SIZE) as i32)
    );

    let mut reader = FrameReader::new();
    let payload = match reader.push(frame) {
        Progress::Frame(payload) => payload,
        other => panic!("unexpected {:?}", other),
    };
    let decoded: RequestRecord = JsonCodec::decode(&payload).unwrap();
    assert_eq!(decoded, record);
}

/// Any chunking of header frame + body yields the same header and the same
/// body bytes once surplus is taken back.
#[test]
fn test_chunked_delivery_invariance() {
    let body = b"the body follows the header frame directly";
    let bytes = Bytes::from(response_frame_with_body(body));

    for seed in 0..200u64 {
        let mut reader = FrameReader::new();
        let mut offset = 0;
        let mut payload = None;
        let mut sizes = chunk_sizes(seed, 9);

        while payload.is_none() {
            let end = (offset + sizes.next().unwrap()).min(bytes.len());
            match reader.push(bytes.slice(offset..end)) {
                Progress::Pending => {}
                Progress::Frame(p) => payload = Some(p),
                other => panic!("seed {}: unexpected {:?}", seed, other),
            }
            offset = end;
        }

        let header: ResponseHeaderRecord = JsonCodec::decode(&payload.unwrap()).unwrap();
        assert_eq!(header.status_code, 200);

        let mut rest = reader.unconsume().to_vec();
        rest.extend_from_slice(&bytes[offset..]);
        assert_eq!(rest, body, "seed {}", seed);
    }
}

/// Payload lengths across byte boundaries survive framing.
#[test]
fn test_framing_round_trip_lengths() {
    for len in [0usize, 1, 127, 128, 255, 256, 4095, 65_536, 300_000] {
        let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let frame = encode(&payload).unwrap();

        assert_eq!(decode_length(&frame[..4]), Some(len as i32));
        assert_eq!(&frame[4..], &payload[..]);

        let mut reader = FrameReader::new();
        match reader.push(frame) {
            Progress::Frame(p) => assert_eq!(&p[..], &payload[..]),
            other => panic!("len {}: unexpected {:?}", len, other),
        }
    }
}

/// Truncation at every point short of a full frame fails on end of stream.
#[test]
fn test_truncated_stream_fails_at_every_cut() {
    let bytes = Bytes::from(response_frame_with_body(b""));

    for cut in 0..bytes.len() {
        let mut reader = FrameReader::new();
        if cut > 0 {
            assert!(matches!(reader.push(bytes.slice(..cut)), Progress::Pending));
        }
        assert!(
            matches!(reader.finish(), Progress::Failed(_)),
            "cut at {}",
            cut
        );
    }
}

/// Every length prefix with the high bit set is rejected.
#[test]
fn test_high_bit_lengths_rejected() {
    for prefix in [[0x80, 0, 0, 0], [0xFF, 0xFF, 0xFF, 0xFF], [0xC0, 0x12, 0x34, 0x56]] {
        let mut reader = FrameReader::new();
        assert!(matches!(
            reader.push(Bytes::copy_from_slice(&prefix)),
            Progress::Failed(_)
        ));
    }
}
