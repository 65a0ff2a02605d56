use crate::error::Result;
use crate::query::Query;
use crate::types::{Event, EventId};
use async_trait::async_trait;

/// Event store: queryable storage for published events
///
/// Projection jobs read their events through this trait, so a job backed
/// by a durable store and a job backed by an in-memory snapshot look the
/// same to the apply callback.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert events
    ///
    /// Fails if an event with the same id is already stored.
    async fn insert(&self, events: &[Event]) -> Result<()>;

    /// Get a single event by id
    async fn find(&self, id: EventId) -> Result<Event>;

    /// Return all events matching `query`, ordered by its sortings
    async fn query(&self, query: &Query) -> Result<Vec<Event>>;

    /// Delete events by id; unknown ids are ignored
    ///
    /// Returns the number of events deleted.
    async fn delete(&self, ids: &[EventId]) -> Result<usize>;
}
