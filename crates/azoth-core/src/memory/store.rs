use crate::error::{AzothError, Result};
use crate::query::Query;
use crate::traits::EventStore;
use crate::types::{Event, EventId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;

/// In-memory event store
///
/// Events are kept in insertion order; queries filter and then sort.
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: RwLock<Vec<Event>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-filled with `events`.
    ///
    /// Unlike [`EventStore::insert`], duplicate ids are not checked; the
    /// caller owns the snapshot.
    pub fn with_events(events: Vec<Event>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert(&self, events: &[Event]) -> Result<()> {
        let mut stored = self.events.write();

        let mut seen: HashSet<EventId> = stored.iter().map(|e| e.id).collect();
        for event in events {
            if !seen.insert(event.id) {
                return Err(AzothError::Store(format!(
                    "duplicate event id {}",
                    event.id
                )));
            }
        }

        stored.extend_from_slice(events);
        Ok(())
    }

    async fn find(&self, id: EventId) -> Result<Event> {
        self.events
            .read()
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| AzothError::NotFound(format!("event {}", id)))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .events
            .read()
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();

        query.sort(&mut events);
        Ok(events)
    }

    async fn delete(&self, ids: &[EventId]) -> Result<usize> {
        let mut stored = self.events.write();
        let before = stored.len();
        stored.retain(|e| !ids.contains(&e.id));
        Ok(before - stored.len())
    }
}
