use crate::error::{AzothError, Result};
use crate::types::Event;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Live feeds returned by [`EventBus::subscribe`]
///
/// `events` yields events in arrival order. `errors` yields delivery
/// failures that did not end the subscription. Both close once the
/// subscription's cancellation token fires (or the bus shuts down).
#[derive(Debug)]
pub struct BusSubscription {
    pub events: mpsc::Receiver<Event>,
    pub errors: mpsc::Receiver<AzothError>,
}

/// Event bus: live publish/subscribe
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish events to every subscriber of their names
    async fn publish(&self, events: &[Event]) -> Result<()>;

    /// Subscribe to events with any of the given names
    ///
    /// Feeds stay open until `cancel` fires.
    async fn subscribe(&self, cancel: CancellationToken, names: &[String])
        -> Result<BusSubscription>;
}
