//! Projection trait applied by jobs.

use azoth_core::Event;
use chrono::{DateTime, Utc};

/// A read model built from events.
///
/// Only [`apply_event`](Projection::apply_event) is required. The other
/// hooks opt a projection into progress tracking, event guarding and
/// resets; their defaults turn each feature off.
pub trait Projection: Send + Sync {
    /// Apply a single event to the projection.
    fn apply_event(&mut self, event: &Event);

    /// Time of the last applied event, if the projection tracks progress.
    ///
    /// Jobs skip events that are not newer than this.
    fn progress(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Record the time of the last applied event.
    fn set_progress(&mut self, _time: DateTime<Utc>) {}

    /// Return false to skip an event.
    fn guard(&self, _event: &Event) -> bool {
        true
    }

    /// Reset the projection to its initial state before a full replay.
    fn reset(&mut self) {}
}
