//! Debounce engine of continuous schedules.
//!
//! Events received from the bus are buffered. Every event restarts the
//! debounce timer; when it elapses the buffer becomes one job. A second
//! timer (the cap) fires the same job creation so a steady trickle of
//! events cannot postpone a job forever for long debounce windows. Both
//! timers are re-armed on every event, so the cap bounds the wait since
//! the most recent event, not since the first event of a burst.
//!
//! Both timers may fire for the same batch. `job_created` makes the
//! second firing a no-op. Every event also bumps the batch epoch and
//! timers remember the epoch they were armed in, so a timer that already
//! fired when it was aborted cannot act on (or clear) a newer batch.

use crate::config::DebounceConfig;
use crate::error::ProjectorError;
use crate::job::Job;
use crate::schedule::send_or_cancel;
use azoth_core::{observe, BusSubscription, Event, MemoryStore, Query, SortBy, SortDirection};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The debounce and cap timers of one subscription.
#[derive(Debug, Default)]
pub(crate) struct DebounceTimers {
    debounce: Option<AbortHandle>,
    cap: Option<AbortHandle>,
}

impl DebounceTimers {
    /// Abort both timers.
    ///
    /// A timer whose callback already holds the engine lock is not
    /// interrupted by this; the caller only gets here after it released.
    fn stop(&mut self) {
        if let Some(timer) = self.debounce.take() {
            timer.abort();
        }
        if let Some(timer) = self.cap.take() {
            timer.abort();
        }
    }

    fn is_armed(&self) -> bool {
        self.debounce.is_some() || self.cap.is_some()
    }
}

#[derive(Debug, Default)]
struct DebounceState {
    buffer: Vec<Event>,
    timers: DebounceTimers,
    job_created: bool,
    epoch: u64,
}

/// Buffers events of one subscription and turns them into jobs.
pub(crate) struct DebounceEngine {
    debounce: Duration,
    cap: Duration,
    cancel: CancellationToken,
    jobs: mpsc::Sender<Job>,
    // Async lock: held across the cancellable job send.
    state: Mutex<DebounceState>,
}

impl DebounceEngine {
    pub(crate) fn new(
        config: &DebounceConfig,
        cancel: CancellationToken,
        jobs: mpsc::Sender<Job>,
    ) -> Arc<Self> {
        Arc::new(Self {
            debounce: config.debounce(),
            cap: config.effective_cap(),
            cancel,
            jobs,
            state: Mutex::new(DebounceState::default()),
        })
    }

    /// Reset the job-created flag and stop both timers.
    pub(crate) async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.job_created = false;
        state.timers.stop();
    }

    /// Turn the buffered events into a job and send it.
    ///
    /// No-op if a job was already created for this batch or nothing is
    /// buffered. Afterwards the batch state is cleared for the next one.
    pub(crate) async fn create_job(&self) {
        if let Some(epoch) = self.try_create_job(None).await {
            self.clear_batch(epoch).await;
        }
    }

    /// Timer callback for the batch of `epoch`.
    async fn fire(&self, epoch: u64) {
        if let Some(epoch) = self.try_create_job(Some(epoch)).await {
            self.clear_batch(epoch).await;
        }
    }

    /// Returns the current epoch, or `None` for a timer of an older batch.
    async fn try_create_job(&self, armed_in: Option<u64>) -> Option<u64> {
        let mut state = self.state.lock().await;
        let epoch = state.epoch;

        if armed_in.is_some_and(|armed| armed != epoch) {
            debug!(armed_in = ?armed_in, epoch, "Ignoring stale debounce timer");
            return None;
        }

        if state.job_created || state.buffer.is_empty() {
            return Some(epoch);
        }

        let events = state.buffer.clone();
        let count = events.len();
        let job = Job::new(
            Arc::new(MemoryStore::with_events(events)),
            Query::new().sort_by(SortBy::Time, SortDirection::Asc),
        );

        if send_or_cancel(&self.cancel, &self.jobs, job).await {
            debug!(events = count, "Created projection job");
            observe::record_job_created(count);
        } else {
            debug!(events = count, "Projection job not delivered, subscription closing");
        }

        state.buffer.clear();
        state.job_created = true;
        Some(epoch)
    }

    /// Like [`clear`](Self::clear), unless a new event already started
    /// another batch.
    async fn clear_batch(&self, epoch: u64) {
        let mut state = self.state.lock().await;
        if state.epoch == epoch {
            state.job_created = false;
            state.timers.stop();
        }
    }

    /// Buffer an event and restart the debounce window.
    pub(crate) async fn add_event(self: &Arc<Self>, event: Event) {
        self.clear().await;

        let mut state = self.state.lock().await;
        debug!(event = %event.name, id = %event.id, "Buffering event");
        state.buffer.push(event);
        state.epoch += 1;

        if self.debounce.is_zero() {
            drop(state);
            self.create_job().await;
            return;
        }

        let epoch = state.epoch;
        state.timers.debounce = Some(self.arm(self.debounce, epoch));
        if !self.cap.is_zero() {
            state.timers.cap = Some(self.arm(self.cap, epoch));
        }
    }

    fn arm(self: &Arc<Self>, delay: Duration, epoch: u64) -> AbortHandle {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.fire(epoch).await;
        })
        .abort_handle()
    }

    /// Consume a bus subscription until cancelled or both feeds close.
    ///
    /// Feed errors go to `out`, best-effort. If the feed ends on its own,
    /// whatever is still buffered is flushed into a final job.
    pub(crate) async fn run(self: Arc<Self>, feed: BusSubscription, out: mpsc::Sender<ProjectorError>) {
        let BusSubscription {
            mut events,
            mut errors,
        } = feed;
        let mut events_open = true;
        let mut errors_open = true;

        while events_open || errors_open {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                event = events.recv(), if events_open => match event {
                    Some(event) => self.add_event(event).await,
                    None => events_open = false,
                },
                err = errors.recv(), if errors_open => match err {
                    Some(err) => {
                        observe::record_feed_error();
                        warn!(error = %err, "Event feed error");
                        if !send_or_cancel(&self.cancel, &out, ProjectorError::Feed(err)).await {
                            debug!("Dropped feed error, nobody is listening");
                        }
                    }
                    None => errors_open = false,
                },
            }
        }

        if !self.cancel.is_cancelled() {
            debug!("Event feed closed, flushing buffered events");
            self.clear().await;
            self.create_job().await;
        }

        self.clear().await;
    }

    #[cfg(test)]
    async fn buffered(&self) -> usize {
        self.state.lock().await.buffer.len()
    }

    #[cfg(test)]
    async fn timers_armed(&self) -> bool {
        self.state.lock().await.timers.is_armed()
    }
}
