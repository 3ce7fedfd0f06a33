//! Public entry point tying sources, aggregation and subscribers together

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::driver::{AggregatorTiming, Driver, IngestEvent};
use crate::fanout::{Fanout, FeedEvent, Subscription};
use crate::log_event::{LogEvent, LogHistory};
use crate::protocol::{DecoderCounts, DecoderStats};
use crate::session::TelemetrySnapshot;
use crate::source::ByteSource;
use crate::sources::{ReplaySource, UdpSource};
use crate::stream::ThrottleExt;
use crate::update_rate::UpdateRate;
use crate::{RelayError, Result};

#[derive(Default)]
struct ActiveSource {
    generation: u64,
    cancel: Option<CancellationToken>,
}

/// Running telemetry relay for one vehicle session.
///
/// Session state lives as long as the relay: sources can come and go (and be
/// replaced) without resetting home, odometer or flight timer. Dropping the
/// relay cancels its tasks; [`Relay::shutdown`] additionally waits for the
/// final disconnected snapshot to reach subscribers.
///
/// ```rust,no_run
/// use groundlink::{Relay, RelayConfig, UpdateRate};
/// use futures::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> groundlink::Result<()> {
///     let relay = Relay::start(RelayConfig::default())?;
///     relay.attach_udp().await?;
///
///     let mut snapshots = relay.snapshots(UpdateRate::Max(4));
///     while let Some(snapshot) = snapshots.next().await {
///         println!("{} {:.1} m", snapshot.flight_mode, snapshot.distance_travelled_meters);
///     }
///     Ok(())
/// }
/// ```
pub struct Relay {
    config: RelayConfig,
    fanout: Fanout,
    updates: mpsc::Sender<IngestEvent>,
    snapshots: watch::Receiver<Arc<TelemetrySnapshot>>,
    stats: Arc<DecoderStats>,
    attached: Arc<AtomicU64>,
    active: Mutex<ActiveSource>,
    aggregator: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Relay {
    /// Validate `config` and start the aggregation task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: RelayConfig) -> Result<Self> {
        config.validate()?;

        let fanout = Fanout::new(config.subscriber_queue);
        let cancel = CancellationToken::new();
        let timing = AggregatorTiming {
            flight_timer_interval: config.flight_timer_interval(),
            link_timeout: config.link_timeout(),
        };
        let channels =
            Driver::spawn_aggregator(fanout.clone(), config.ingest_queue, timing, cancel.clone());

        info!("Relay started");

        Ok(Self {
            config,
            fanout,
            updates: channels.updates,
            snapshots: channels.snapshots,
            stats: Arc::new(DecoderStats::default()),
            attached: channels.attached,
            active: Mutex::new(ActiveSource::default()),
            aggregator: Mutex::new(Some(channels.task)),
            cancel,
        })
    }

    /// Start ingesting from `source`, replacing any active source.
    ///
    /// Fails once the relay has shut down.
    pub fn attach<S>(&self, source: S) -> Result<()>
    where
        S: ByteSource,
    {
        if self.cancel.is_cancelled() {
            return Err(RelayError::channel_closed("relay has shut down"));
        }
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.generation += 1;
        self.attached.store(active.generation, Ordering::Release);
        if let Some(previous) = active.cancel.take() {
            debug!(generation = active.generation - 1, "Replacing active source");
            previous.cancel();
        }
        let token = self.cancel.child_token();
        active.cancel = Some(token.clone());

        info!(source = %source.describe(), generation = active.generation, "Attaching source");
        Driver::spawn_ingest(
            source,
            active.generation,
            Arc::clone(&self.stats),
            self.updates.clone(),
            token,
        );
        Ok(())
    }

    /// Bind the configured UDP address and attach it. Returns the bound address.
    pub async fn attach_udp(&self) -> Result<SocketAddr> {
        let source = UdpSource::bind(self.config.udp_bind).await?;
        let addr = source.local_addr()?;
        self.attach(source)?;
        Ok(addr)
    }

    /// Replay a raw capture file using the configured chunking.
    pub async fn attach_replay<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let source = ReplaySource::open(
            path,
            self.config.replay_chunk_size,
            self.config.replay_chunk_interval(),
        )
        .await?;
        self.attach(source)
    }

    /// Stop the active source, if any.
    ///
    /// Subscribers see `connected = false` and a disconnect notice; the rest of
    /// the session is kept.
    pub fn detach(&self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = active.cancel.take() {
            token.cancel();
        }
    }

    /// Subscribe to every snapshot and log event.
    pub fn subscribe(&self) -> Subscription {
        self.fanout.subscribe()
    }

    /// Snapshot-only stream, optionally throttled (latest wins).
    ///
    /// Yields the current snapshot first. Ends when the relay shuts down.
    pub fn snapshots(&self, rate: UpdateRate) -> BoxStream<'static, Arc<TelemetrySnapshot>> {
        let stream = WatchStream::new(self.snapshots.clone());
        match rate.interval() {
            None => stream.boxed(),
            Some(period) => stream.throttle(period).boxed(),
        }
    }

    /// Log-only stream.
    pub fn logs(&self) -> impl Stream<Item = LogEvent> + Send + 'static {
        self.subscribe().filter_map(|event| async move {
            match event {
                FeedEvent::Log(log) => Some(log),
                FeedEvent::Snapshot(_) => None,
            }
        })
    }

    /// Empty log history sized by the `log_history` setting.
    pub fn log_history(&self) -> LogHistory {
        LogHistory::new(self.config.log_history)
    }

    /// Latest published snapshot.
    pub fn current(&self) -> Arc<TelemetrySnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn decoder_stats(&self) -> DecoderCounts {
        self.stats.snapshot()
    }

    pub fn subscriber_count(&self) -> usize {
        self.fanout.subscriber_count()
    }

    /// Log events lost to full subscriber queues.
    pub fn dropped_events(&self) -> u64 {
        self.fanout.dropped_events()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Cancel every task and wait for subscribers to receive the final
    /// disconnected snapshot. Their streams end afterwards.
    pub async fn shutdown(&self) {
        info!("Relay shutting down");
        self.cancel.cancel();
        let task = self.aggregator.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Aggregator task failed during shutdown: {}", e);
            }
        }
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        debug!("Dropping relay");
        // Cancel tasks on drop for clean shutdown
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::ids;
    use crate::sources::MemorySource;
    use crate::test_utils::{FrameBuilder, payloads};
    use std::time::Duration;

    async fn wait_for<F>(relay: &Relay, mut predicate: F) -> Arc<TelemetrySnapshot>
    where
        F: FnMut(&TelemetrySnapshot) -> bool,
    {
        let mut snapshots = relay.snapshots(UpdateRate::Native);
        while let Some(snapshot) = snapshots.next().await {
            if predicate(&snapshot) {
                return snapshot;
            }
        }
        panic!("snapshot stream ended before predicate matched");
    }

    #[tokio::test]
    async fn start_rejects_invalid_config() {
        let config = RelayConfig { ingest_queue: 0, ..RelayConfig::default() };
        assert!(Relay::start(config).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn attaching_replaces_the_active_source() {
        let relay = Relay::start(RelayConfig::default()).unwrap();

        let quiet = MemorySource::from_chunks(Vec::<Vec<u8>>::new()).keep_open();
        relay.attach(quiet).unwrap();
        wait_for(&relay, |s| s.connected).await;

        let frame = FrameBuilder::v2().build(ids::GPS_RAW_INT, &payloads::gps_raw(3, 12));
        relay.attach(MemorySource::from_chunks(vec![frame]).keep_open()).unwrap();

        let snapshot = wait_for(&relay, |s| s.satellite_count == 12).await;
        assert!(snapshot.connected);
        assert_eq!(relay.decoder_stats().decoded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_publishes_final_snapshot_and_ends_streams() {
        let relay = Relay::start(RelayConfig::default()).unwrap();
        relay.attach(MemorySource::default().keep_open()).unwrap();
        wait_for(&relay, |s| s.connected).await;

        let mut sub = relay.subscribe();
        let mut snapshots = relay.snapshots(UpdateRate::Max(10));
        relay.shutdown().await;

        let mut last = None;
        while let Some(event) = sub.next().await {
            if let FeedEvent::Snapshot(s) = event {
                last = Some(s);
            }
        }
        assert!(!last.expect("final snapshot").connected);
        assert_eq!(relay.subscriber_count(), 0);

        let remaining: Vec<_> = tokio::time::timeout(Duration::from_secs(5), async {
            let mut items = Vec::new();
            while let Some(s) = snapshots.next().await {
                items.push(s);
            }
            items
        })
        .await
        .expect("snapshot stream ends after shutdown");
        assert!(remaining.last().is_some_and(|s| !s.connected));
    }

    #[tokio::test(start_paused = true)]
    async fn detach_disconnects_and_keeps_session() {
        let relay = Relay::start(RelayConfig::default()).unwrap();
        let mut sub = relay.subscribe();
        let frame = FrameBuilder::v2().build(ids::GPS_RAW_INT, &payloads::gps_raw(3, 12));
        relay.attach(MemorySource::from_chunks(vec![frame]).keep_open()).unwrap();
        wait_for(&relay, |s| s.connected && s.satellite_count == 12).await;

        relay.detach();
        let snapshot = wait_for(&relay, |s| !s.connected).await;
        assert_eq!(snapshot.satellite_count, 12);

        let mut logs = Vec::new();
        while !logs.iter().any(|l: &String| l == "Vehicle link disconnected") {
            if let Some(FeedEvent::Log(log)) = sub.next().await {
                logs.push(log.message().to_string());
            }
        }
        assert_eq!(logs, ["Vehicle link connected (memory)", "Vehicle link disconnected"]);
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_a_source_does_not_announce_a_disconnect() {
        let relay = Relay::start(RelayConfig::default()).unwrap();
        let mut sub = relay.subscribe();
        relay.attach(MemorySource::default().keep_open()).unwrap();
        relay.attach(MemorySource::default().keep_open()).unwrap();
        relay.detach();

        let mut logs = Vec::new();
        while let Some(event) = sub.next().await {
            if let FeedEvent::Log(log) = event {
                logs.push(log.message().to_string());
                if log.message() == "Vehicle link disconnected" {
                    break;
                }
            }
        }
        assert_eq!(
            logs,
            [
                "Vehicle link connected (memory)",
                "Vehicle link connected (memory)",
                "Vehicle link disconnected",
            ]
        );
    }

    #[tokio::test]
    async fn attach_after_shutdown_fails() {
        let relay = Relay::start(RelayConfig::default()).unwrap();
        relay.shutdown().await;
        let err = relay.attach(MemorySource::default()).unwrap_err();
        assert!(matches!(err, RelayError::ChannelClosed { .. }));
    }

    #[tokio::test]
    async fn log_history_uses_configured_capacity() {
        let config = RelayConfig { log_history: 5, ..RelayConfig::default() };
        let relay = Relay::start(config).unwrap();
        assert_eq!(relay.log_history().capacity(), 5);
    }
}
