//! MAVLink wire protocol: framing, checksums and typed messages.
//!
//! ## Architecture
//!
//! - [`crc`] implements the X.25 checksum with per-message `CRC_EXTRA` seeding
//! - [`frame`] buffers arbitrary transport chunks and yields whole frames
//! - [`message`] maps the seven recognized message ids onto [`DecodedMessage`]
//!
//! [`decode_stream`] glues a [`ByteSource`] to a [`FrameDecoder`] and exposes
//! the result as a lazy stream that ends when the source closes.

pub mod crc;
pub mod frame;
pub mod message;

pub use frame::{
    DecoderCounts, DecoderStats, Frame, FrameDecoder, FrameHeader, MAGIC_V1, MAGIC_V2,
    ProtocolVersion,
};
pub use message::{DecodedMessage, MessageSpec, spec_for};

use futures::Stream;
use futures::stream;

use crate::Result;
use crate::source::ByteSource;

struct DecodeState<S> {
    source: S,
    decoder: FrameDecoder,
    closed: bool,
}

/// Decode frames from a byte source as a lazy stream.
///
/// The stream yields frames as soon as they are complete and never ends while
/// the source is open. Source read errors are yielded as `Err` items without
/// ending the stream, so the caller decides whether to retry. When the source
/// reports it has closed, any partial frame is discarded and the stream ends.
pub fn decode_stream<S>(source: S, decoder: FrameDecoder) -> impl Stream<Item = Result<Frame>>
where
    S: ByteSource,
{
    let state = DecodeState { source, decoder, closed: false };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.decoder.next_frame() {
                return Some((Ok(frame), state));
            }
            if state.closed {
                return None;
            }
            match state.source.next_chunk().await {
                Ok(Some(chunk)) => state.decoder.push(&chunk),
                Ok(None) => state.closed = true,
                Err(e) => return Some((Err(e), state)),
            }
        }
    })
}
