//! Manual triggers.

use azoth_core::Query;

/// A request to create a projection job now, independent of event arrival.
///
/// ```ignore
/// schedule
///     .trigger(&cancel, Trigger::new().reset(true))
///     .await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Trigger {
    /// Reset projections before applying the job.
    pub reset: bool,
    /// Replaces the schedule's default query (its event names, by time).
    pub query: Option<Query>,
    /// Extra filters every event of the job must pass.
    pub filters: Vec<Query>,
}

impl Trigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset projections before applying the job.
    pub fn reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    /// Fetch the job's events with `query` instead of the default query.
    pub fn query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    /// Add a filter the job's events must pass.
    pub fn filter(mut self, filter: Query) -> Self {
        self.filters.push(filter);
        self
    }
}
