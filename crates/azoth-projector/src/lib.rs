//! Azoth Projector: schedules that keep projections up to date
//!
//! A schedule decides when a projection [`Job`] is created; the caller's
//! apply function decides what a job does to its projections.
//!
//! Key features:
//! - Continuous schedules fed by an [`EventBus`](azoth_core::EventBus)
//! - Debouncing of event bursts, bounded by a cap
//! - Startup jobs and manual triggers over the event store
//! - Cancellation-driven shutdown that drains queued jobs

pub mod config;
pub mod error;
pub mod job;
pub mod projection;
pub mod schedule;
pub mod subscription;
pub mod trigger;

pub use config::{compute_debounce_cap, DebounceConfig, DEFAULT_DEBOUNCE_BARRIER, DEFAULT_DEBOUNCE_CAP};
pub use error::{ProjectorError, Result};
pub use job::Job;
pub use projection::Projection;
pub use schedule::{ApplyFn, Continuous, ContinuousBuilder, Schedule, TriggerHandle};
pub use subscription::SubscribeOptions;
pub use trigger::Trigger;
