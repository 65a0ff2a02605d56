pub mod event_bus;
pub mod event_store;

pub use event_bus::{BusSubscription, EventBus};
pub use event_store::EventStore;
