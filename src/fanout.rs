//! Subscriber fan-out for snapshots and log events.
//!
//! Every subscriber owns a bounded queue. Publishing never waits. When a
//! subscriber's queue is full, a log event is lost for that subscriber only,
//! while a snapshot is parked in the subscriber's own latest-snapshot cell and
//! delivered once the queue drains, so a slow subscriber always ends up with the
//! newest state. A subscriber whose receiving side is gone is removed from the
//! registry.

use futures::Stream;
use std::collections::HashMap;
use std::future::poll_fn;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace, warn};

use crate::log_event::LogEvent;
use crate::session::TelemetrySnapshot;

/// One notification delivered to subscribers.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Snapshot(Arc<TelemetrySnapshot>),
    Log(LogEvent),
}

/// Newest snapshot that did not fit in a subscriber's queue
type ParkedSnapshot = Arc<Mutex<Option<Arc<TelemetrySnapshot>>>>;

struct SubscriberSlot {
    tx: mpsc::Sender<FeedEvent>,
    parked: ParkedSnapshot,
    dropped: u64,
}

struct Registry {
    next_id: u64,
    capacity: usize,
    subscribers: HashMap<u64, SubscriberSlot>,
    latest: Option<Arc<TelemetrySnapshot>>,
    dropped_total: u64,
    closed: bool,
}

impl Registry {
    fn deliver_snapshot(&mut self, snapshot: Arc<TelemetrySnapshot>) {
        self.subscribers.retain(|id, slot| {
            match slot.tx.try_send(FeedEvent::Snapshot(Arc::clone(&snapshot))) {
                Ok(()) => {
                    // A queued snapshot supersedes anything parked earlier.
                    *lock_parked(&slot.parked) = None;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    trace!(subscriber = id, "Subscriber queue full, parking latest snapshot");
                    *lock_parked(&slot.parked) = Some(Arc::clone(&snapshot));
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(subscriber = id, "Subscriber went away, deregistering");
                    false
                }
            }
        });
    }

    fn deliver_log(&mut self, event: LogEvent) {
        let mut newly_dropped = 0;
        self.subscribers.retain(|id, slot| match slot.tx.try_send(FeedEvent::Log(event.clone())) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                slot.dropped += 1;
                newly_dropped += 1;
                if slot.dropped == 1 || slot.dropped % 100 == 0 {
                    warn!(subscriber = id, dropped = slot.dropped, "Subscriber queue full");
                }
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber = id, "Subscriber went away, deregistering");
                false
            }
        });
        self.dropped_total += newly_dropped;
    }
}

fn lock_parked(parked: &ParkedSnapshot) -> MutexGuard<'_, Option<Arc<TelemetrySnapshot>>> {
    parked.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of subscribers with independent lifecycles.
///
/// Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct Fanout {
    inner: Arc<Mutex<Registry>>,
}

impl Fanout {
    /// Create a fan-out whose subscribers queue up to `capacity` events each.
    pub fn new(capacity: usize) -> Self {
        let registry = Registry {
            next_id: 0,
            capacity: capacity.max(1),
            subscribers: HashMap::new(),
            latest: None,
            dropped_total: 0,
            closed: false,
        };
        Self { inner: Arc::new(Mutex::new(registry)) }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a subscriber.
    ///
    /// The most recent snapshot, if any, is queued immediately so a new
    /// subscriber starts in sync. Subscribing after [`Fanout::close`] yields a
    /// stream that ends after that snapshot.
    pub fn subscribe(&self) -> Subscription {
        let mut registry = self.lock();
        let (tx, rx) = mpsc::channel(registry.capacity);
        let parked = ParkedSnapshot::default();
        let id = registry.next_id;
        registry.next_id += 1;

        if let Some(latest) = &registry.latest {
            let _ = tx.try_send(FeedEvent::Snapshot(Arc::clone(latest)));
        }
        if !registry.closed {
            let slot = SubscriberSlot { tx, parked: Arc::clone(&parked), dropped: 0 };
            registry.subscribers.insert(id, slot);
            debug!(subscriber = id, total = registry.subscribers.len(), "Subscriber registered");
        }

        Subscription { id, rx, parked, registry: Arc::downgrade(&self.inner) }
    }

    pub fn publish_snapshot(&self, snapshot: Arc<TelemetrySnapshot>) {
        let mut registry = self.lock();
        registry.latest = Some(Arc::clone(&snapshot));
        registry.deliver_snapshot(snapshot);
    }

    pub fn publish_log(&self, event: LogEvent) {
        self.lock().deliver_log(event);
    }

    pub fn latest(&self) -> Option<Arc<TelemetrySnapshot>> {
        self.lock().latest.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Log events lost to full subscriber queues since creation.
    ///
    /// Snapshots are never lost this way; a full queue only coalesces them.
    pub fn dropped_events(&self) -> u64 {
        self.lock().dropped_total
    }

    /// Deregister everyone; their streams end once drained.
    pub fn close(&self) {
        let mut registry = self.lock();
        registry.closed = true;
        registry.subscribers.clear();
    }
}

/// Receiving side of one subscriber. Dropping it deregisters.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<FeedEvent>,
    parked: ParkedSnapshot,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, or `None` once the relay has shut down.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        poll_fn(|cx| self.poll_event(cx)).await
    }

    /// Queued events first; a parked snapshot is only ever newer than
    /// everything still queued, so it is handed out once the queue is empty.
    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Option<FeedEvent>> {
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => Poll::Ready(Some(event)),
            idle => match lock_parked(&self.parked).take() {
                Some(snapshot) => Poll::Ready(Some(FeedEvent::Snapshot(snapshot))),
                None => idle,
            },
        }
    }
}

impl Stream for Subscription {
    type Item = FeedEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.poll_event(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            let mut registry = inner.lock().unwrap_or_else(PoisonError::into_inner);
            if registry.subscribers.remove(&self.id).is_some() {
                debug!(subscriber = self.id, "Subscriber dropped");
            }
        }
    }
}
