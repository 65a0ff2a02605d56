//! Error types for projection schedules.

use azoth_core::AzothError;
use thiserror::Error;

/// Result type for projector operations.
pub type Result<T> = std::result::Result<T, ProjectorError>;

/// Errors that can occur while scheduling or running projection jobs.
#[derive(Debug, Error)]
pub enum ProjectorError {
    /// The event bus rejected the subscription.
    #[error("subscribe to {names:?} events: {source}")]
    Subscribe {
        /// Event names the schedule tried to subscribe to.
        names: Vec<String>,
        #[source]
        source: AzothError,
    },

    /// The startup job could not be built or applied.
    #[error("startup: {0}")]
    Startup(#[source] anyhow::Error),

    /// The bus reported an error on the subscription's error feed.
    #[error("event feed: {0}")]
    Feed(#[source] AzothError),

    /// The apply function returned an error for a job.
    #[error("apply job: {0}")]
    Apply(#[source] anyhow::Error),

    /// Store access failed while reading a job's events.
    #[error("store: {0}")]
    Store(#[from] AzothError),

    /// No event of the job belongs to an aggregate with this name.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(String),

    /// The operation was cancelled before it completed.
    #[error("cancelled")]
    Cancelled,
}
