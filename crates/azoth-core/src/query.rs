//! Event queries: filters plus ordered sortings
//!
//! A [`Query`] ANDs every filter that is set; an unset filter matches
//! everything. Sortings are applied in the order they were added, later
//! sortings only breaking ties of earlier ones.

use crate::types::{Event, EventId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// Field to sort events by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortBy {
    Time,
    AggregateName,
    AggregateId,
    AggregateVersion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortOptions {
    pub sort: SortBy,
    pub dir: SortDirection,
}

impl SortOptions {
    /// Compare two events by this sorting.
    pub fn compare(&self, a: &Event, b: &Event) -> Ordering {
        let ord = match self.sort {
            SortBy::Time => a.time.cmp(&b.time),
            SortBy::AggregateName => a.aggregate_name().cmp(&b.aggregate_name()),
            SortBy::AggregateId => {
                let ida = a.aggregate.as_ref().map(|r| r.id);
                let idb = b.aggregate.as_ref().map(|r| r.id);
                ida.cmp(&idb)
            }
            SortBy::AggregateVersion => {
                let va = a.aggregate.as_ref().map(|r| r.version);
                let vb = b.aggregate.as_ref().map(|r| r.version);
                va.cmp(&vb)
            }
        };

        match self.dir {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }
}

/// Event query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    names: Vec<String>,
    ids: Vec<EventId>,
    aggregate_names: Vec<String>,
    aggregate_ids: Vec<Uuid>,
    time_min: Option<DateTime<Utc>>,
    time_max: Option<DateTime<Utc>>,
    sortings: Vec<SortOptions>,
}

impl Query {
    /// Create a query that matches every event, unsorted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to events with one of the given names.
    pub fn names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(names.into_iter().map(Into::into));
        self
    }

    /// Restrict to events with one of the given ids.
    pub fn ids(mut self, ids: impl IntoIterator<Item = EventId>) -> Self {
        self.ids.extend(ids);
        self
    }

    /// Restrict to events belonging to aggregates with one of the given names.
    pub fn aggregate_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aggregate_names
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Restrict to events belonging to aggregates with one of the given ids.
    pub fn aggregate_ids(mut self, ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.aggregate_ids.extend(ids);
        self
    }

    /// Restrict to events that occurred at or after `time`.
    pub fn time_min(mut self, time: DateTime<Utc>) -> Self {
        self.time_min = Some(time);
        self
    }

    /// Restrict to events that occurred at or before `time`.
    pub fn time_max(mut self, time: DateTime<Utc>) -> Self {
        self.time_max = Some(time);
        self
    }

    /// Append a sorting. Earlier sortings take precedence.
    pub fn sort_by(mut self, sort: SortBy, dir: SortDirection) -> Self {
        self.sortings.push(SortOptions { sort, dir });
        self
    }

    pub fn sortings(&self) -> &[SortOptions] {
        &self.sortings
    }

    pub fn event_names(&self) -> &[String] {
        &self.names
    }

    /// Check whether an event passes every filter of this query.
    pub fn matches(&self, event: &Event) -> bool {
        if !self.names.is_empty() && !self.names.iter().any(|n| *n == event.name) {
            return false;
        }

        if !self.ids.is_empty() && !self.ids.contains(&event.id) {
            return false;
        }

        if !self.aggregate_names.is_empty() {
            match event.aggregate_name() {
                Some(name) if self.aggregate_names.iter().any(|n| n == name) => {}
                _ => return false,
            }
        }

        if !self.aggregate_ids.is_empty() {
            match &event.aggregate {
                Some(aggregate) if self.aggregate_ids.contains(&aggregate.id) => {}
                _ => return false,
            }
        }

        if let Some(min) = self.time_min {
            if event.time < min {
                return false;
            }
        }

        if let Some(max) = self.time_max {
            if event.time > max {
                return false;
            }
        }

        true
    }

    /// Stable-sort events by this query's sortings.
    ///
    /// A query without sortings leaves the slice untouched.
    pub fn sort(&self, events: &mut [Event]) {
        if self.sortings.is_empty() {
            return;
        }

        events.sort_by(|a, b| {
            self.sortings
                .iter()
                .map(|s| s.compare(a, b))
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
    }
}
