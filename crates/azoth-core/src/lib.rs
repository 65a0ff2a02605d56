//! Azoth Core: events, queries and the store/bus abstractions projections run on
//!
//! This crate defines the pieces every projection schedule consumes:
//! - [`Event`]: a named, timestamped domain event with an optional aggregate
//! - [`Query`]: filters plus ordered sortings over events
//! - [`EventStore`]: queryable event storage
//! - [`EventBus`]: live publish/subscribe of events with cancellable feeds
//!
//! In-memory implementations of the store and bus live in [`memory`]. They
//! back ephemeral job stores and tests; durable backends implement the same
//! traits.

pub mod error;
pub mod memory;
pub mod observe;
pub mod query;
pub mod traits;
pub mod types;

pub use error::{AzothError, Result};
pub use memory::{MemoryBus, MemoryStore};
pub use query::{Query, SortBy, SortDirection, SortOptions};
pub use traits::{BusSubscription, EventBus, EventStore};
pub use types::{AggregateRef, Event, EventId};
