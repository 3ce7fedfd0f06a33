//! Incremental MAVLink frame decoder.
//!
//! Transport chunks (UDP datagrams, serial reads, file blocks) do not line up
//! with frame boundaries, so the decoder accumulates bytes and only yields a
//! frame once all of it is buffered.
//!
//! Recovery rules:
//! - Bytes before a start marker (`0xFE` v1, `0xFD` v2) are skipped.
//! - A frame with a bad checksum or unsupported v2 incompat flags is dropped and
//!   scanning restarts one byte after the rejected marker, so a corrupted
//!   length byte cannot swallow a valid frame that follows it.
//! - Frames with unrecognized ids are reported as [`Frame::Unrecognized`] as
//!   soon as the header is buffered. Their checksum cannot be checked without
//!   the message's `CRC_EXTRA`, so their length is not trusted either: scanning
//!   resumes one byte after the marker, as for a rejected frame.

use bytes::{Buf, BytesMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use super::crc::frame_checksum;
use super::message::{DecodedMessage, spec_for};
use crate::{RelayError, Result};

/// MAVLink 1 start marker
pub const MAGIC_V1: u8 = 0xFE;
/// MAVLink 2 start marker
pub const MAGIC_V2: u8 = 0xFD;

const HEADER_LEN_V1: usize = 6;
const HEADER_LEN_V2: usize = 10;
const CHECKSUM_LEN: usize = 2;
const SIGNATURE_LEN: usize = 13;
const INCOMPAT_FLAG_SIGNED: u8 = 0x01;

/// Protocol generation a frame was received in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V1,
    V2,
}

/// Generic frame header, available for every well-formed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: ProtocolVersion,
    pub payload_len: u8,
    pub sequence: u8,
    pub system_id: u8,
    pub component_id: u8,
    pub msg_id: u32,
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Recognized message with a verified checksum
    Message { header: FrameHeader, message: DecodedMessage },
    /// Message id outside the recognized set; only the header is decoded
    Unrecognized(FrameHeader),
}

/// Shared decoder counters.
///
/// Kept behind an `Arc` so the relay can report them while the decoder is
/// owned by an ingest task.
#[derive(Debug, Default)]
pub struct DecoderStats {
    decoded: AtomicU64,
    dropped: AtomicU64,
    unrecognized: AtomicU64,
    skipped_bytes: AtomicU64,
}

/// Point-in-time copy of [`DecoderStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderCounts {
    /// Recognized frames with a valid checksum
    pub decoded: u64,
    /// Frames rejected for a bad checksum or malformed header
    pub dropped: u64,
    /// Frames with an id outside the recognized set
    pub unrecognized: u64,
    /// Bytes discarded while searching for a start marker
    pub skipped_bytes: u64,
}

impl DecoderStats {
    pub fn snapshot(&self) -> DecoderCounts {
        DecoderCounts {
            decoded: self.decoded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            unrecognized: self.unrecognized.load(Ordering::Relaxed),
            skipped_bytes: self.skipped_bytes.load(Ordering::Relaxed),
        }
    }
}

enum Parse {
    Incomplete,
    Rejected,
    Unrecognized(FrameHeader),
    Complete { frame: Frame, consumed: usize },
}

/// Streaming MAVLink v1/v2 frame decoder.
///
/// Usable directly through [`FrameDecoder::push`] / [`FrameDecoder::next_frame`],
/// or as a [`tokio_util::codec::Decoder`] with `FramedRead`.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    stats: Arc<DecoderStats>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder that reports into existing counters.
    pub fn with_stats(stats: Arc<DecoderStats>) -> Self {
        Self { buf: BytesMut::new(), stats }
    }

    pub fn stats(&self) -> DecoderCounts {
        self.stats.snapshot()
    }

    /// Append a transport chunk to the internal buffer.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete frame from the internal buffer, if any.
    pub fn next_frame(&mut self) -> Option<Frame> {
        decode_from(&self.stats, &mut self.buf)
    }

    /// Bytes currently buffered waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

impl Decoder for FrameDecoder {
    type Item = Frame;
    type Error = RelayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        Ok(decode_from(&self.stats, src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if let Some(frame) = decode_from(&self.stats, src) {
            return Ok(Some(frame));
        }
        let remaining = src.len();
        if remaining > 0 {
            debug!(bytes = remaining, "Discarding partial frame at end of stream");
            skip(&self.stats, src, remaining);
        }
        Ok(None)
    }
}

fn decode_from(stats: &DecoderStats, src: &mut BytesMut) -> Option<Frame> {
    loop {
        let Some(start) = src.iter().position(|&b| b == MAGIC_V1 || b == MAGIC_V2) else {
            let remaining = src.len();
            skip(stats, src, remaining);
            return None;
        };
        skip(stats, src, start);

        match parse_frame(src) {
            Parse::Incomplete => return None,
            Parse::Rejected => {
                stats.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("Dropping malformed frame, resynchronizing");
                src.advance(1);
            }
            Parse::Unrecognized(header) => {
                stats.unrecognized.fetch_add(1, Ordering::Relaxed);
                src.advance(1);
                return Some(Frame::Unrecognized(header));
            }
            Parse::Complete { frame, consumed } => {
                src.advance(consumed);
                stats.decoded.fetch_add(1, Ordering::Relaxed);
                return Some(frame);
            }
        }
    }
}

fn skip(stats: &DecoderStats, src: &mut BytesMut, count: usize) {
    if count > 0 {
        stats.skipped_bytes.fetch_add(count as u64, Ordering::Relaxed);
        src.advance(count);
    }
}

/// Try to parse one frame starting at `src[0]`, which must be a start marker.
fn parse_frame(src: &[u8]) -> Parse {
    match src[0] {
        MAGIC_V1 => parse_v1(src),
        _ => parse_v2(src),
    }
}

fn parse_v1(src: &[u8]) -> Parse {
    if src.len() < HEADER_LEN_V1 {
        return Parse::Incomplete;
    }
    let payload_len = src[1];
    let header = FrameHeader {
        version: ProtocolVersion::V1,
        payload_len,
        sequence: src[2],
        system_id: src[3],
        component_id: src[4],
        msg_id: src[5] as u32,
    };
    let Some(crc_extra) = spec_for(header.msg_id).map(|spec| spec.crc_extra) else {
        return Parse::Unrecognized(header);
    };

    let body_end = HEADER_LEN_V1 + payload_len as usize;
    let total = body_end + CHECKSUM_LEN;
    if src.len() < total {
        return Parse::Incomplete;
    }
    finish(
        header,
        crc_extra,
        &src[1..body_end],
        &src[HEADER_LEN_V1..body_end],
        &src[body_end..total],
        total,
    )
}

fn parse_v2(src: &[u8]) -> Parse {
    if src.len() < HEADER_LEN_V2 {
        return Parse::Incomplete;
    }
    let payload_len = src[1];
    let incompat_flags = src[2];
    if incompat_flags & !INCOMPAT_FLAG_SIGNED != 0 {
        return Parse::Rejected;
    }
    let header = FrameHeader {
        version: ProtocolVersion::V2,
        payload_len,
        sequence: src[4],
        system_id: src[5],
        component_id: src[6],
        msg_id: u32::from_le_bytes([src[7], src[8], src[9], 0]),
    };
    let Some(crc_extra) = spec_for(header.msg_id).map(|spec| spec.crc_extra) else {
        return Parse::Unrecognized(header);
    };

    let signature_len =
        if incompat_flags & INCOMPAT_FLAG_SIGNED != 0 { SIGNATURE_LEN } else { 0 };
    let body_end = HEADER_LEN_V2 + payload_len as usize;
    let total = body_end + CHECKSUM_LEN + signature_len;
    if src.len() < total {
        return Parse::Incomplete;
    }
    finish(
        header,
        crc_extra,
        &src[1..body_end],
        &src[HEADER_LEN_V2..body_end],
        &src[body_end..body_end + CHECKSUM_LEN],
        total,
    )
}

fn finish(
    header: FrameHeader,
    crc_extra: u8,
    body: &[u8],
    payload: &[u8],
    checksum: &[u8],
    total: usize,
) -> Parse {
    let received = u16::from_le_bytes([checksum[0], checksum[1]]);
    if frame_checksum(body, crc_extra) != received {
        return Parse::Rejected;
    }

    match DecodedMessage::parse(header.msg_id, payload) {
        Some(message) => {
            Parse::Complete { frame: Frame::Message { header, message }, consumed: total }
        }
        None => Parse::Rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::ids;
    use crate::test_utils::{FrameBuilder, payloads};
    use proptest::prelude::*;

    fn heartbeat_frame(seq: u8) -> Vec<u8> {
        FrameBuilder::v2().sequence(seq).build(ids::HEARTBEAT, &payloads::heartbeat(4, 128))
    }

    fn drain(decoder: &mut FrameDecoder) -> Vec<Frame> {
        std::iter::from_fn(|| decoder.next_frame()).collect()
    }

    #[test]
    fn decodes_v2_heartbeat() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&heartbeat_frame(7));

        let frame = decoder.next_frame().expect("frame");
        let Frame::Message { header, message } = frame else { panic!("expected message") };
        assert_eq!(header.version, ProtocolVersion::V2);
        assert_eq!(header.sequence, 7);
        assert_eq!(header.msg_id, ids::HEARTBEAT);
        assert!(matches!(message, DecodedMessage::Heartbeat(hb) if hb.custom_mode == 4));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn decodes_v1_frames() {
        let bytes = FrameBuilder::v1().build(ids::ATTITUDE, &payloads::attitude(0.1, -0.2, 1.5));
        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);

        let Some(Frame::Message { header, message }) = decoder.next_frame() else {
            panic!("expected message")
        };
        assert_eq!(header.version, ProtocolVersion::V1);
        assert!(matches!(message, DecodedMessage::Attitude(att) if att.yaw == 1.5));
    }

    #[test]
    fn waits_for_complete_frame_across_chunks() {
        let bytes = heartbeat_frame(1);
        let mut decoder = FrameDecoder::new();

        for (i, byte) in bytes.iter().enumerate() {
            decoder.push(&[*byte]);
            let frame = decoder.next_frame();
            if i + 1 < bytes.len() {
                assert!(frame.is_none(), "frame yielded early at byte {i}");
            } else {
                assert!(frame.is_some());
            }
        }
    }

    #[test]
    fn bad_checksum_is_dropped_and_next_frame_decodes() {
        let mut corrupt = heartbeat_frame(1);
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xFF;

        let mut decoder = FrameDecoder::new();
        decoder.push(&corrupt);
        decoder.push(&heartbeat_frame(2));

        let frames = drain(&mut decoder);
        assert_eq!(frames.len(), 1);
        let Frame::Message { header, .. } = &frames[0] else { panic!("expected message") };
        assert_eq!(header.sequence, 2);

        let stats = decoder.stats();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.decoded, 1);
    }

    #[test]
    fn corrupted_length_does_not_swallow_following_frame() {
        let mut corrupt = heartbeat_frame(1);
        corrupt[1] = 200;

        let mut decoder = FrameDecoder::new();
        decoder.push(&corrupt);
        decoder.push(&heartbeat_frame(2));
        // The bogus length waits for more data; padding lets the bad frame complete.
        decoder.push(&[0u8; 300]);

        let frames = drain(&mut decoder);
        assert!(frames.iter().any(
            |f| matches!(f, Frame::Message { header, .. } if header.sequence == 2)
        ));
        assert!(decoder.stats().dropped >= 1);
    }

    #[test]
    fn leading_garbage_is_skipped() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&[0x00, 0x11, 0x22]);
        decoder.push(&heartbeat_frame(3));

        assert!(decoder.next_frame().is_some());
        assert_eq!(decoder.stats().skipped_bytes, 3);
    }

    #[test]
    fn unknown_message_ids_yield_header_only() {
        let bytes = FrameBuilder::v2().build(148, &[1, 2, 3, 4]);
        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);
        decoder.push(&heartbeat_frame(9));

        let frames = drain(&mut decoder);
        assert!(matches!(
            frames[0],
            Frame::Unrecognized(h) if h.msg_id == 148 && h.payload_len == 4
        ));
        assert!(matches!(
            frames.last(),
            Some(Frame::Message { header, .. }) if header.sequence == 9
        ));
        assert!(decoder.stats().unrecognized >= 1);
    }

    #[test]
    fn stray_marker_with_unknown_id_does_not_swallow_following_frames() {
        let mut decoder = FrameDecoder::new();
        // A v1 marker claiming a 32-byte payload with id 153.
        decoder.push(&[0x00, MAGIC_V1, 0x20, 0x00, 0x01, 0x01, 0x99]);
        decoder.push(&heartbeat_frame(42));
        decoder.push(&heartbeat_frame(43));

        let frames = drain(&mut decoder);
        let sequences: Vec<u8> = frames
            .iter()
            .filter_map(|f| match f {
                Frame::Message { header, .. } => Some(header.sequence),
                Frame::Unrecognized(_) => None,
            })
            .collect();
        assert_eq!(sequences, vec![42, 43]);

        let stats = decoder.stats();
        assert_eq!(stats.decoded, 2);
        assert_eq!(stats.unrecognized, 1);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn unknown_id_is_reported_before_its_claimed_payload_arrives() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&[MAGIC_V2, 0xFF, 0x00, 0x00, 0x00, 0x01, 0x01, 0x94, 0x00, 0x00]);

        assert!(matches!(decoder.next_frame(), Some(Frame::Unrecognized(h)) if h.msg_id == 148));
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn signed_frames_skip_the_signature() {
        let bytes = FrameBuilder::v2().signed().build(ids::HEARTBEAT, &payloads::heartbeat(5, 0));
        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);
        decoder.push(&heartbeat_frame(4));

        let frames = drain(&mut decoder);
        assert_eq!(frames.len(), 2);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn unsupported_incompat_flags_are_rejected() {
        let mut bytes = heartbeat_frame(1);
        bytes[2] = 0x02;
        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);

        assert!(drain(&mut decoder).is_empty());
        assert!(decoder.stats().dropped >= 1);
    }

    #[test]
    fn codec_decode_eof_discards_partial_frame() {
        let bytes = heartbeat_frame(1);
        let mut decoder = FrameDecoder::new();
        let mut src = BytesMut::from(&bytes[..bytes.len() - 3]);

        assert!(decoder.decode(&mut src).unwrap().is_none());
        assert!(decoder.decode_eof(&mut src).unwrap().is_none());
        assert!(src.is_empty());
    }

    proptest! {
        #[test]
        fn every_frame_survives_arbitrary_chunking(
            sequences in prop::collection::vec(any::<u8>(), 1..20),
            chunk_size in 1usize..64,
        ) {
            let stream: Vec<u8> = sequences.iter().flat_map(|&s| heartbeat_frame(s)).collect();
            let mut decoder = FrameDecoder::new();
            let mut seen = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                decoder.push(chunk);
                while let Some(Frame::Message { header, .. }) = decoder.next_frame() {
                    seen.push(header.sequence);
                }
            }
            prop_assert_eq!(seen, sequences);
        }

        #[test]
        fn garbage_between_frames_never_hides_a_valid_frame(
            garbage in prop::collection::vec(any::<u8>(), 0..40),
        ) {
            let mut decoder = FrameDecoder::new();
            decoder.push(&garbage);
            decoder.push(&heartbeat_frame(42));
            // Lets a bogus header claiming a long recognized payload complete
            // and fail its checksum.
            decoder.push(&[0u8; 300]);

            let frames = drain(&mut decoder);
            let found = frames.iter().any(|f| match f {
                Frame::Message { header, message: DecodedMessage::Heartbeat(_) } => {
                    header.sequence == 42
                }
                _ => false,
            });
            prop_assert!(found);
        }

        #[test]
        fn marker_free_garbage_is_skipped_byte_for_byte(
            garbage in prop::collection::vec(
                any::<u8>().prop_filter("no markers", |b| *b != MAGIC_V1 && *b != MAGIC_V2),
                0..40,
            ),
        ) {
            let mut decoder = FrameDecoder::new();
            decoder.push(&garbage);
            decoder.push(&heartbeat_frame(42));
            let frames = drain(&mut decoder);
            prop_assert_eq!(frames.len(), 1);
            prop_assert_eq!(decoder.stats().skipped_bytes, garbage.len() as u64);
        }
    }
}
