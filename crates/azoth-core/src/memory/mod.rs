//! In-memory store and bus
//!
//! Used for ephemeral per-job snapshots and for tests. Nothing here
//! survives the process.

pub mod bus;
pub mod store;

pub use bus::MemoryBus;
pub use store::MemoryStore;
