pub mod event;

pub use event::{AggregateRef, Event, EventId};
