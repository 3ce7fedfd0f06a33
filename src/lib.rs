//! MAVLink telemetry relay for ground-control dashboards.
//!
//! Groundlink decodes a vehicle's MAVLink v1/v2 byte stream, folds the
//! recognized messages into one evolving session snapshot, and pushes that
//! snapshot and a human-readable session log to any number of subscribers.
//!
//! # Features
//!
//! - **Resilient decoding**: arbitrary chunking, garbage and corrupted frames
//!   never stall the stream
//! - **Derived navigation**: home position, filtered odometer, bearing to home
//!   and an armed-time flight clock
//! - **Independent subscribers**: bounded per-subscriber queues; a slow
//!   dashboard never holds up the vehicle link
//! - **Pluggable transports**: UDP (port 14550 by default), capture replay and
//!   in-memory sources behind one [`ByteSource`] trait
//!
//! # Pipeline
//!
//! ```text
//! ByteSource ─▶ FrameDecoder ─▶ interpret ─▶ (channel) ─▶ Aggregator ─▶ Fanout ─▶ subscribers
//! ```
//!
//! ## Example (UDP)
//!
//! ```rust,no_run
//! use groundlink::{FeedEvent, Relay, RelayConfig};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> groundlink::Result<()> {
//!     let relay = Relay::start(RelayConfig::default())?;
//!     relay.attach_udp().await?;
//!
//!     let mut feed = relay.subscribe();
//!     while let Some(event) = feed.next().await {
//!         match event {
//!             FeedEvent::Snapshot(s) => println!("{} armed={}", s.flight_mode, s.armed),
//!             FeedEvent::Log(line) => println!("{line}"),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
pub mod log_event;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod update_rate;

// Decode → interpret → aggregate → fan out
pub mod fanout;
pub mod interpret;
pub mod protocol;
pub mod session;

// Transports and task orchestration
mod driver;
pub mod relay;
pub mod source;
pub mod sources;
pub mod stream;

// Core exports
pub use config::RelayConfig;
pub use error::*;
pub use log_event::{LogEvent, LogHistory};
pub use update_rate::UpdateRate;

// Pipeline exports
pub use fanout::{Fanout, FeedEvent, Subscription};
pub use interpret::{PartialUpdate, interpret};
pub use protocol::{DecodedMessage, DecoderCounts, Frame, FrameDecoder, decode_stream};
pub use session::{Aggregator, GeoPoint, GpsFixType, TelemetrySnapshot};

// Main API exports
pub use relay::Relay;
pub use source::ByteSource;
pub use sources::{MemorySource, ReplaySource, UdpSource};
