use crate::error::{AzothError, Result};
use crate::traits::{BusSubscription, EventBus};
use crate::types::Event;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default per-subscriber feed capacity
pub const DEFAULT_FEED_CAPACITY: usize = 64;

struct Subscriber {
    names: Vec<String>,
    events: mpsc::Sender<Event>,
    // Held so the error feed stays open for as long as the event feed.
    _errors: mpsc::Sender<AzothError>,
}

/// In-process event bus
///
/// Each subscriber gets its own bounded feed; `publish` waits for room
/// in every matching feed, so a slow subscriber applies backpressure to
/// publishers instead of dropping events.
pub struct MemoryBus {
    subscribers: Arc<Mutex<HashMap<u64, Subscriber>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FEED_CAPACITY)
    }

    /// Create a bus whose subscriber feeds buffer up to `capacity` events.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be positive");
        Self {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            capacity,
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn publish(&self, events: &[Event]) -> Result<()> {
        for event in events {
            // Never hold the registry lock across a send.
            let targets: Vec<mpsc::Sender<Event>> = self
                .subscribers
                .lock()
                .values()
                .filter(|s| s.names.iter().any(|n| *n == event.name))
                .map(|s| s.events.clone())
                .collect();

            for tx in targets {
                if tx.send(event.clone()).await.is_err() {
                    tracing::debug!(event = %event.name, "Subscriber gone, skipping delivery");
                }
            }
        }

        Ok(())
    }

    async fn subscribe(
        &self,
        cancel: CancellationToken,
        names: &[String],
    ) -> Result<BusSubscription> {
        if names.is_empty() {
            return Err(AzothError::Bus(
                "subscribe requires at least one event name".into(),
            ));
        }

        let (event_tx, events) = mpsc::channel(self.capacity);
        let (error_tx, errors) = mpsc::channel(1);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        self.subscribers.lock().insert(
            id,
            Subscriber {
                names: names.to_vec(),
                events: event_tx,
                _errors: error_tx,
            },
        );

        tracing::debug!(subscription = id, names = ?names, "Bus subscription registered");

        // Dropping the senders closes both feeds.
        let subscribers = Arc::clone(&self.subscribers);
        tokio::spawn(async move {
            cancel.cancelled().await;
            subscribers.lock().remove(&id);
            tracing::debug!(subscription = id, "Bus subscription removed");
        });

        Ok(BusSubscription { events, errors })
    }
}
