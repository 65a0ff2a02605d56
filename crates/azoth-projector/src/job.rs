//! Projection jobs.
//!
//! A [`Job`] is a batch of events waiting to be applied to projections. It
//! does not hold the events itself: it holds a store and a query, and reads
//! through them on demand. Debounced jobs point at an in-memory snapshot of
//! their batch; triggered jobs point at the schedule's store.
//!
//! Every read is cached per filter set, so calling the helpers repeatedly
//! from an apply function costs one store query.

use crate::error::{ProjectorError, Result};
use crate::projection::Projection;
use azoth_core::{AggregateRef, AzothError, Event, EventStore, Query};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

struct JobInner {
    store: Arc<dyn EventStore>,
    query: Query,
    filters: Vec<Query>,
    reset: bool,
    cache: Mutex<HashMap<String, Arc<Vec<Event>>>>,
}

/// A unit of projection work. Cloning is cheap; clones share the cache.
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("query", &self.inner.query)
            .field("filters", &self.inner.filters)
            .field("reset", &self.inner.reset)
            .finish_non_exhaustive()
    }
}

impl Job {
    /// Create a job over the events of `store` matched by `query`.
    pub fn new(store: Arc<dyn EventStore>, query: Query) -> Self {
        Self::from_parts(store, query, Vec::new(), false)
    }

    /// Create a job with extra filters and a reset flag.
    pub fn from_parts(
        store: Arc<dyn EventStore>,
        query: Query,
        filters: Vec<Query>,
        reset: bool,
    ) -> Self {
        Self {
            inner: Arc::new(JobInner {
                store,
                query,
                filters,
                reset,
                cache: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The query the job reads its events with.
    pub fn query(&self) -> &Query {
        &self.inner.query
    }

    /// Whether projections are reset before this job is applied.
    pub fn reset(&self) -> bool {
        self.inner.reset
    }

    /// Fetch the job's events that pass every filter in `filters`.
    pub async fn events(&self, filters: &[Query]) -> Result<Vec<Event>> {
        let key = serde_json::to_string(filters).map_err(AzothError::from)?;

        if let Some(cached) = self.inner.cache.lock().get(&key) {
            return Ok(cached.as_ref().clone());
        }

        let mut events = self.inner.store.query(&self.inner.query).await?;
        events.retain(|e| {
            self.inner
                .filters
                .iter()
                .chain(filters)
                .all(|f| f.matches(e))
        });

        let events = Arc::clone(
            self.inner
                .cache
                .lock()
                .entry(key)
                .or_insert_with(|| Arc::new(events)),
        );

        Ok(events.as_ref().clone())
    }

    /// Fetch the job's events that belong to aggregates with one of `names`.
    pub async fn events_of<I, S>(&self, names: I) -> Result<Vec<Event>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events(&[Query::new().aggregate_names(names)]).await
    }

    /// Fetch the events that would be applied to `target`.
    ///
    /// Skips events not newer than the target's progress (unless the job
    /// resets) and events rejected by the target's guard.
    pub async fn events_for<P>(&self, target: &P) -> Result<Vec<Event>>
    where
        P: Projection + ?Sized,
    {
        let progress = if self.inner.reset {
            None
        } else {
            target.progress()
        };

        let mut events = self.events(&[]).await?;
        events.retain(|e| progress.map_or(true, |p| e.time > p) && target.guard(e));
        Ok(events)
    }

    /// Extract the aggregates referenced by the job's events.
    ///
    /// Each aggregate appears once, in order of first occurrence, carrying
    /// the highest version seen. With a non-empty `names`, only aggregates
    /// with one of those names are returned.
    pub async fn aggregates(&self, names: &[&str]) -> Result<Vec<AggregateRef>> {
        let events = self.events(&[]).await?;

        let mut refs: Vec<AggregateRef> = Vec::new();
        let mut index: HashMap<(String, Uuid), usize> = HashMap::new();

        for aggregate in events.into_iter().filter_map(|e| e.aggregate) {
            if !names.is_empty() && !names.contains(&aggregate.name.as_str()) {
                continue;
            }

            match index.get(&(aggregate.name.clone(), aggregate.id)) {
                Some(&i) => {
                    refs[i].version = refs[i].version.max(aggregate.version);
                }
                None => {
                    index.insert((aggregate.name.clone(), aggregate.id), refs.len());
                    refs.push(aggregate);
                }
            }
        }

        Ok(refs)
    }

    /// Id of the first aggregate named `name` in the job's events.
    pub async fn aggregate(&self, name: &str) -> Result<Uuid> {
        self.aggregates(&[name])
            .await?
            .first()
            .map(|a| a.id)
            .ok_or_else(|| ProjectorError::AggregateNotFound(name.to_string()))
    }

    /// Apply the job to `target`.
    ///
    /// Resets the target first if the job resets, applies
    /// [`events_for`](Job::events_for) in order and advances the target's
    /// progress to the last applied event.
    pub async fn apply<P>(&self, target: &mut P) -> Result<()>
    where
        P: Projection + ?Sized,
    {
        if self.inner.reset {
            target.reset();
        }

        let events = self.events_for(&*target).await?;
        for event in &events {
            target.apply_event(event);
        }

        if let Some(last) = events.last() {
            target.set_progress(last.time);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use azoth_core::{MemoryStore, SortBy, SortDirection};
    use chrono::{DateTime, Duration, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    // Store wrapper that counts queries so cache hits are observable.
    struct CountingStore {
        inner: MemoryStore,
        queries: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl EventStore for CountingStore {
        async fn insert(&self, events: &[Event]) -> azoth_core::Result<()> {
            self.inner.insert(events).await
        }

        async fn find(&self, id: Uuid) -> azoth_core::Result<Event> {
            self.inner.find(id).await
        }

        async fn query(&self, query: &Query) -> azoth_core::Result<Vec<Event>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.inner.query(query).await
        }

        async fn delete(&self, ids: &[Uuid]) -> azoth_core::Result<usize> {
            self.inner.delete(ids).await
        }
    }

    #[derive(Default)]
    struct Counter {
        applied: Vec<String>,
        progress: Option<DateTime<Utc>>,
        resets: usize,
    }

    impl Projection for Counter {
        fn apply_event(&mut self, event: &Event) {
            self.applied.push(event.name.clone());
        }

        fn progress(&self) -> Option<DateTime<Utc>> {
            self.progress
        }

        fn set_progress(&mut self, time: DateTime<Utc>) {
            self.progress = Some(time);
        }

        fn guard(&self, event: &Event) -> bool {
            event.name != "ignored"
        }

        fn reset(&mut self) {
            self.applied.clear();
            self.progress = None;
            self.resets += 1;
        }
    }

    fn sample_events() -> (Vec<Event>, Uuid, Uuid) {
        let order = Uuid::new_v4();
        let customer = Uuid::new_v4();
        let events = vec![
            Event::new("order_placed", json!({}))
                .with_time(at(1))
                .with_aggregate("order", order, 1),
            Event::new("customer_created", json!({}))
                .with_time(at(0))
                .with_aggregate("customer", customer, 1),
            Event::new("order_shipped", json!({}))
                .with_time(at(2))
                .with_aggregate("order", order, 2),
            Event::new("ignored", json!({})).with_time(at(3)),
        ];
        (events, order, customer)
    }

    fn job_over(events: Vec<Event>) -> (Job, Arc<CountingStore>) {
        let store = Arc::new(CountingStore {
            inner: MemoryStore::with_events(events),
            queries: AtomicUsize::new(0),
        });
        let job = Job::new(
            store.clone(),
            Query::new().sort_by(SortBy::Time, SortDirection::Asc),
        );
        (job, store)
    }

    #[tokio::test]
    async fn test_events_are_sorted_and_cached() {
        let (events, _, _) = sample_events();
        let (job, store) = job_over(events);

        let first = job.events(&[]).await.unwrap();
        let second = job.events(&[]).await.unwrap();

        let names: Vec<_> = first.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            ["customer_created", "order_placed", "order_shipped", "ignored"]
        );
        assert_eq!(first, second);
        assert_eq!(store.queries.load(Ordering::SeqCst), 1);

        // A different filter set is a separate cache entry.
        let filtered = job
            .events(&[Query::new().names(["order_placed"])])
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(store.queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_events_of_aggregates() {
        let (events, _, _) = sample_events();
        let (job, _) = job_over(events);

        let orders = job.events_of(["order"]).await.unwrap();
        let names: Vec<_> = orders.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["order_placed", "order_shipped"]);
    }

    #[tokio::test]
    async fn test_aggregates_are_unique_with_latest_version() {
        let (events, order, customer) = sample_events();
        let (job, _) = job_over(events);

        let all = job.aggregates(&[]).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, customer);
        assert_eq!(all[1].id, order);
        assert_eq!(all[1].version, 2);

        let orders = job.aggregates(&["order"]).await.unwrap();
        assert_eq!(orders.len(), 1);

        assert_eq!(job.aggregate("order").await.unwrap(), order);
        assert!(matches!(
            job.aggregate("invoice").await,
            Err(ProjectorError::AggregateNotFound(name)) if name == "invoice"
        ));
    }

    #[tokio::test]
    async fn test_apply_respects_progress_and_guard() {
        let (events, _, _) = sample_events();
        let (job, _) = job_over(events);

        let mut proj = Counter {
            progress: Some(at(0)),
            ..Default::default()
        };
        job.apply(&mut proj).await.unwrap();

        assert_eq!(proj.applied, ["order_placed", "order_shipped"]);
        assert_eq!(proj.progress, Some(at(2)));

        // Applying again is a no-op: everything is behind the progress.
        job.apply(&mut proj).await.unwrap();
        assert_eq!(proj.applied.len(), 2);
    }

    #[tokio::test]
    async fn test_reset_job_replays_everything() {
        let (events, _, _) = sample_events();
        let store: Arc<dyn EventStore> = Arc::new(MemoryStore::with_events(events));
        let job = Job::from_parts(
            store,
            Query::new().sort_by(SortBy::Time, SortDirection::Asc),
            Vec::new(),
            true,
        );

        let mut proj = Counter {
            applied: vec!["stale".into()],
            progress: Some(at(0) + Duration::days(1)),
            resets: 0,
        };
        job.apply(&mut proj).await.unwrap();

        assert_eq!(proj.resets, 1);
        assert_eq!(
            proj.applied,
            ["customer_created", "order_placed", "order_shipped"]
        );
    }

    #[tokio::test]
    async fn test_job_filters_apply_to_every_read() {
        let (events, _, _) = sample_events();
        let store: Arc<dyn EventStore> = Arc::new(MemoryStore::with_events(events));
        let job = Job::from_parts(
            store,
            Query::new(),
            vec![Query::new().aggregate_names(["order"])],
            false,
        );

        assert_eq!(job.events(&[]).await.unwrap().len(), 2);
        assert_eq!(job.aggregates(&[]).await.unwrap().len(), 1);
    }
}
