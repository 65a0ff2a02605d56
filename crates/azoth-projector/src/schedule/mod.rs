//! Projection schedules.
//!
//! A schedule decides *when* projection jobs are created. [`Schedule`] is
//! the shared base: it owns the event store and event names, keeps the
//! trigger registrations of live subscriptions and runs the job
//! application loop. [`Continuous`] builds on it and creates jobs from
//! live bus events.

pub mod continuous;
pub mod debounce;

pub use continuous::{Continuous, ContinuousBuilder};

use crate::error::{ProjectorError, Result};
use crate::job::Job;
use crate::trigger::Trigger;
use azoth_core::{observe, EventStore, Query, SortBy, SortDirection};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Type-erased apply function shared by the startup job and the apply loop.
pub type ApplyFn = Arc<dyn Fn(Job) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Send `value` unless `cancel` fires first.
///
/// Returns false if the value was not delivered, either because of
/// cancellation or because the receiver is gone.
pub(crate) async fn send_or_cancel<T>(
    cancel: &CancellationToken,
    tx: &mpsc::Sender<T>,
    value: T,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        res = tx.send(value) => res.is_ok(),
    }
}

/// Handle of one subscription's trigger registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerHandle(u64);

/// Base schedule shared by all schedule kinds
pub struct Schedule {
    store: Arc<dyn EventStore>,
    event_names: Vec<String>,
    triggers: Mutex<HashMap<u64, mpsc::Sender<Trigger>>>,
    next_trigger_id: AtomicU64,
}

impl Schedule {
    pub fn new<I, S>(store: Arc<dyn EventStore>, event_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            store,
            event_names: event_names.into_iter().map(Into::into).collect(),
            triggers: Mutex::new(HashMap::new()),
            next_trigger_id: AtomicU64::new(0),
        }
    }

    pub fn event_names(&self) -> &[String] {
        &self.event_names
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Manually trigger a projection job in every live subscription.
    ///
    /// Returns [`ProjectorError::Cancelled`] if `cancel` fires before every
    /// subscription accepted the trigger.
    pub async fn trigger(&self, cancel: &CancellationToken, trigger: Trigger) -> Result<()> {
        let targets: Vec<mpsc::Sender<Trigger>> = self.triggers.lock().values().cloned().collect();

        for tx in targets {
            if !send_or_cancel(cancel, &tx, trigger.clone()).await {
                if cancel.is_cancelled() {
                    return Err(ProjectorError::Cancelled);
                }
                debug!("Trigger registration closed, skipping");
            }
        }

        Ok(())
    }

    /// Number of subscriptions currently accepting triggers.
    pub fn trigger_registrations(&self) -> usize {
        self.triggers.lock().len()
    }

    pub(crate) fn new_triggers(&self) -> (TriggerHandle, mpsc::Receiver<Trigger>) {
        let (tx, rx) = mpsc::channel(1);
        let id = self.next_trigger_id.fetch_add(1, Ordering::SeqCst);
        self.triggers.lock().insert(id, tx);
        (TriggerHandle(id), rx)
    }

    pub(crate) fn remove_triggers(&self, handle: TriggerHandle) {
        self.triggers.lock().remove(&handle.0);
    }

    /// Default query of triggered jobs: the schedule's events, oldest first.
    pub fn default_query(&self) -> Query {
        Query::new()
            .names(self.event_names.iter().cloned())
            .sort_by(SortBy::Time, SortDirection::Asc)
    }

    pub(crate) fn new_job(
        &self,
        store: Arc<dyn EventStore>,
        query: Query,
        filters: Vec<Query>,
        reset: bool,
    ) -> Job {
        Job::from_parts(store, query, filters, reset)
    }

    pub(crate) fn job_for_trigger(&self, trigger: &Trigger) -> Job {
        let query = trigger
            .query
            .clone()
            .unwrap_or_else(|| self.default_query());

        self.new_job(
            Arc::clone(&self.store),
            query,
            trigger.filters.clone(),
            trigger.reset,
        )
    }

    /// Build a job from `trigger` and apply it before anything else runs.
    pub(crate) async fn apply_startup_job(&self, trigger: &Trigger, apply: &ApplyFn) -> Result<()> {
        let job = self.job_for_trigger(trigger);
        debug!(reset = trigger.reset, "Applying startup job");

        let started = Instant::now();
        let result = apply(job).await;
        observe::record_job_applied(started.elapsed(), result.is_ok());

        result.map_err(ProjectorError::Startup)
    }

    /// Turn manual triggers into jobs until cancelled or `feed_closed` fires.
    pub(crate) async fn handle_triggers(
        self: Arc<Self>,
        cancel: CancellationToken,
        feed_closed: CancellationToken,
        mut triggers: mpsc::Receiver<Trigger>,
        jobs: mpsc::Sender<Job>,
    ) {
        loop {
            let trigger = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = feed_closed.cancelled() => break,
                trigger = triggers.recv() => match trigger {
                    Some(trigger) => trigger,
                    None => break,
                },
            };

            debug!(reset = trigger.reset, "Creating triggered projection job");
            let job = self.job_for_trigger(&trigger);

            if !send_or_cancel(&cancel, &jobs, job).await {
                break;
            }
        }
    }

    /// Apply jobs until the job channel is closed, then signal `done`.
    ///
    /// Apply errors are forwarded to `out` and do not stop the loop. Jobs
    /// already queued when `cancel` fires are still applied; only error
    /// delivery is abandoned.
    pub(crate) async fn apply_jobs(
        apply: ApplyFn,
        cancel: CancellationToken,
        mut jobs: mpsc::Receiver<Job>,
        out: mpsc::Sender<ProjectorError>,
        done: oneshot::Sender<()>,
    ) {
        while let Some(job) = jobs.recv().await {
            let started = Instant::now();
            let result = apply(job).await;
            observe::record_job_applied(started.elapsed(), result.is_ok());

            if let Err(err) = result {
                warn!(error = %err, "Projection job failed");
                if !send_or_cancel(&cancel, &out, ProjectorError::Apply(err)).await {
                    debug!("Dropped apply error, nobody is listening");
                }
            }
        }

        let _ = done.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use azoth_core::{Event, MemoryStore};
    use serde_json::json;
    use std::time::Duration;

    fn schedule_with(events: Vec<Event>) -> Arc<Schedule> {
        Arc::new(Schedule::new(
            Arc::new(MemoryStore::with_events(events)),
            ["foo", "bar"],
        ))
    }

    #[tokio::test]
    async fn test_trigger_registration_lifecycle() {
        let schedule = schedule_with(vec![]);
        assert_eq!(schedule.trigger_registrations(), 0);

        let (a, _rx_a) = schedule.new_triggers();
        let (b, _rx_b) = schedule.new_triggers();
        assert_ne!(a, b);
        assert_eq!(schedule.trigger_registrations(), 2);

        schedule.remove_triggers(a);
        assert_eq!(schedule.trigger_registrations(), 1);
    }

    #[tokio::test]
    async fn test_trigger_reaches_every_registration() {
        let schedule = schedule_with(vec![]);
        let (_a, mut rx_a) = schedule.new_triggers();
        let (_b, mut rx_b) = schedule.new_triggers();

        schedule
            .trigger(&CancellationToken::new(), Trigger::new().reset(true))
            .await
            .unwrap();

        assert!(rx_a.recv().await.unwrap().reset);
        assert!(rx_b.recv().await.unwrap().reset);
    }

    #[tokio::test]
    async fn test_trigger_cancelled() {
        let schedule = schedule_with(vec![]);
        // Fill the registration so the next send blocks.
        let (_handle, _rx) = schedule.new_triggers();
        let cancel = CancellationToken::new();
        schedule.trigger(&cancel, Trigger::new()).await.unwrap();

        cancel.cancel();
        let result = schedule.trigger(&cancel, Trigger::new()).await;
        assert!(matches!(result, Err(ProjectorError::Cancelled)));
    }

    #[tokio::test]
    async fn test_triggered_job_uses_default_query() {
        let events = vec![
            Event::new("foo", json!(1)),
            Event::new("baz", json!(2)),
            Event::new("bar", json!(3)),
        ];
        let schedule = schedule_with(events);

        let job = schedule.job_for_trigger(&Trigger::new());
        let names: Vec<_> = job
            .events(&[])
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["foo", "bar"]);
        assert!(!job.reset());

        let custom = schedule.job_for_trigger(&Trigger::new().query(Query::new().names(["baz"])));
        assert_eq!(custom.events(&[]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_apply_jobs_forwards_errors_and_signals_done() {
        let schedule = schedule_with(vec![Event::new("foo", json!(null))]);
        let apply: ApplyFn = Arc::new(|_job: Job| -> BoxFuture<'static, anyhow::Result<()>> {
            Box::pin(async { Err(anyhow::anyhow!("boom")) })
        });

        let (jobs_tx, jobs_rx) = mpsc::channel(1);
        let (out_tx, mut out_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = oneshot::channel();

        let task = tokio::spawn(Schedule::apply_jobs(
            apply,
            CancellationToken::new(),
            jobs_rx,
            out_tx,
            done_tx,
        ));

        jobs_tx
            .send(schedule.job_for_trigger(&Trigger::new()))
            .await
            .unwrap();
        let err = out_rx.recv().await.unwrap();
        assert!(matches!(err, ProjectorError::Apply(_)));

        drop(jobs_tx);
        tokio::time::timeout(Duration::from_secs(1), done_rx)
            .await
            .expect("apply loop should finish")
            .unwrap();
        task.await.unwrap();
        assert!(out_rx.recv().await.is_none());
    }
}
