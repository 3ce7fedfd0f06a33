//! Driver spawns and manages the relay's background tasks
//!
//! Two kinds of task cooperate through one bounded channel:
//!
//! - an **ingest task** per attached source, which owns the source and the
//!   frame decoder and turns bytes into [`PartialUpdate`]s
//! - a single **aggregator task**, which owns the [`Aggregator`] and is the
//!   only place session state changes
//!
//! Ingest events carry the generation of the source that produced them. When a
//! source is replaced, anything still in flight from the old one is ignored.
//! An ingest task always reports `Closed` when it stops, including when it is
//! cancelled, so detaching a source disconnects the session.

use futures::StreamExt;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::fanout::Fanout;
use crate::interpret::{PartialUpdate, interpret};
use crate::log_event::LogEvent;
use crate::protocol::{DecoderStats, Frame, FrameDecoder, decode_stream};
use crate::session::{Aggregator, TelemetrySnapshot};
use crate::source::ByteSource;

/// Consecutive source errors tolerated before the source is treated as closed
const MAX_ERRORS: u32 = 10;

/// Messages from ingest tasks to the aggregator task
#[derive(Debug)]
pub(crate) enum IngestEvent {
    Opened { generation: u64, source: String },
    Update { generation: u64, update: PartialUpdate },
    Closed { generation: u64, source: String },
}

/// Handles to a running aggregator task
pub(crate) struct AggregatorChannels {
    /// Sender for ingest tasks
    pub updates: mpsc::Sender<IngestEvent>,
    /// Latest published snapshot
    pub snapshots: watch::Receiver<Arc<TelemetrySnapshot>>,
    /// Generation of the most recently attached source
    pub attached: Arc<AtomicU64>,
    /// Task handle, completes after the final snapshot is published
    pub task: JoinHandle<()>,
}

/// Timing knobs for the aggregator task
#[derive(Debug, Clone, Copy)]
pub(crate) struct AggregatorTiming {
    pub flight_timer_interval: Duration,
    pub link_timeout: Option<Duration>,
}

pub(crate) struct Driver;

impl Driver {
    /// Spawn the aggregator task
    pub fn spawn_aggregator(
        fanout: Fanout,
        ingest_queue: usize,
        timing: AggregatorTiming,
        cancel: CancellationToken,
    ) -> AggregatorChannels {
        let (tx, rx) = mpsc::channel(ingest_queue.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(TelemetrySnapshot::default()));
        let attached = Arc::new(AtomicU64::new(0));

        let task = tokio::spawn({
            let attached = Arc::clone(&attached);
            async move {
                Self::aggregator_task(rx, fanout, snapshot_tx, attached, timing, cancel).await;
            }
        });

        AggregatorChannels { updates: tx, snapshots: snapshot_rx, attached, task }
    }

    /// Spawn an ingest task for `source`
    pub fn spawn_ingest<S>(
        source: S,
        generation: u64,
        stats: Arc<DecoderStats>,
        updates: mpsc::Sender<IngestEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()>
    where
        S: ByteSource,
    {
        tokio::spawn(async move {
            Self::ingest_task(source, generation, stats, updates, cancel).await;
        })
    }

    async fn aggregator_task(
        mut rx: mpsc::Receiver<IngestEvent>,
        fanout: Fanout,
        snapshot_tx: watch::Sender<Arc<TelemetrySnapshot>>,
        attached: Arc<AtomicU64>,
        timing: AggregatorTiming,
        cancel: CancellationToken,
    ) {
        info!("Aggregator task started");
        let mut aggregator = Aggregator::new();
        let mut generation = 0u64;
        let mut opened_at: Option<Instant> = None;
        let mut link_lost = false;
        let mut update_count = 0u64;

        let mut timer = interval(timing.flight_timer_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let publish = |aggregator: &Aggregator| {
            let snapshot = aggregator.publish();
            snapshot_tx.send_replace(Arc::clone(&snapshot));
            fanout.publish_snapshot(snapshot);
        };
        let notice = |message: String| {
            info!("{}", message);
            fanout.publish_log(LogEvent::now(message));
        };

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Aggregator cancelled");
                    break;
                }
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => {
                        debug!("All ingest senders dropped");
                        break;
                    }
                },
                _ = timer.tick() => {
                    let now = Instant::now();
                    let mut changed = aggregator.tick_flight_timer(now);

                    if let Some(timeout) = timing.link_timeout {
                        let reference = aggregator.last_update().into_iter().chain(opened_at).max();
                        let silent = reference
                            .is_some_and(|at| now.saturating_duration_since(at) >= timeout);
                        if silent && !link_lost && aggregator.snapshot().connected {
                            link_lost = true;
                            changed |= aggregator.set_connected(false);
                            warn!(?timeout, "No telemetry received, marking link lost");
                            notice("Telemetry link lost".to_string());
                        }
                    }

                    if changed {
                        publish(&aggregator);
                    }
                    continue;
                }
            };

            match event {
                IngestEvent::Opened { generation: g, source } => {
                    if g < generation {
                        continue;
                    }
                    generation = g;
                    opened_at = Some(Instant::now());
                    link_lost = false;
                    if aggregator.set_connected(true) {
                        publish(&aggregator);
                    }
                    notice(format!("Vehicle link connected ({source})"));
                }
                IngestEvent::Update { generation: g, update } => {
                    if g != generation {
                        trace!(stale = g, current = generation, "Ignoring stale update");
                        continue;
                    }
                    update_count += 1;
                    let outcome = aggregator.apply(update, Instant::now());

                    let mut changed = outcome.snapshot_changed;
                    if link_lost {
                        link_lost = false;
                        changed |= aggregator.set_connected(true);
                        notice("Telemetry link restored".to_string());
                    }
                    if changed {
                        publish(&aggregator);
                    }
                    if let Some(log) = outcome.log {
                        fanout.publish_log(log);
                    }
                }
                IngestEvent::Closed { generation: g, source } => {
                    // A replaced source may close before its successor opens.
                    if g != generation || g < attached.load(Ordering::Acquire) {
                        continue;
                    }
                    debug!(%source, "Source closed");
                    if aggregator.set_connected(false) {
                        publish(&aggregator);
                    }
                    notice("Vehicle link disconnected".to_string());
                }
            }
        }

        aggregator.set_connected(false);
        publish(&aggregator);
        fanout.close();
        info!("Aggregator task ended (applied {} updates)", update_count);
    }

    async fn ingest_task<S>(
        source: S,
        generation: u64,
        stats: Arc<DecoderStats>,
        updates: mpsc::Sender<IngestEvent>,
        cancel: CancellationToken,
    ) where
        S: ByteSource,
    {
        let description = source.describe();
        info!(source = %description, generation, "Ingest task started");

        let opened = IngestEvent::Opened { generation, source: description.clone() };
        if updates.send(opened).await.is_err() {
            return;
        }

        let mut frames = pin!(decode_stream(source, FrameDecoder::with_stats(stats)));
        let mut frame_count = 0u64;
        let mut error_count = 0u32;

        loop {
            // Use select to allow cancellation while waiting on the source
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(source = %description, "Ingest cancelled");
                    break;
                }
                next = frames.next() => next,
            };

            match next {
                Some(Ok(Frame::Message { header, message })) => {
                    frame_count += 1;
                    error_count = 0;
                    trace!(seq = header.sequence, msg = message.name(), "Frame {}", frame_count);

                    let Some(update) = interpret(&message) else { continue };
                    let event = IngestEvent::Update { generation, update };
                    let sent = tokio::select! {
                        _ = cancel.cancelled() => break,
                        sent = updates.send(event) => sent,
                    };
                    if sent.is_err() {
                        debug!("Aggregator gone, stopping ingest");
                        return;
                    }
                }
                Some(Ok(Frame::Unrecognized(header))) => {
                    error_count = 0;
                    trace!(msg_id = header.msg_id, len = header.payload_len, "Unrecognized id");
                }
                Some(Err(e)) => {
                    // Source error - don't give up on transient failures
                    error_count += 1;
                    error!("Source error ({}/{}): {}", error_count, MAX_ERRORS, e);

                    if error_count >= MAX_ERRORS {
                        error!(source = %description, "Too many source errors, closing source");
                        break;
                    }

                    // Exponential backoff: 100ms, 200ms, ... capped at 1.6s
                    let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                None => {
                    info!(source = %description, "Source closed after {} frames", frame_count);
                    break;
                }
            }
        }

        // Fails only once the aggregator has stopped.
        let _ = updates.send(IngestEvent::Closed { generation, source: description }).await;
    }
}
