//! Continuous schedule: jobs from live bus events.
//!
//! # Example
//!
//! ```ignore
//! let schedule = Continuous::builder(bus, store, ["order_placed", "order_shipped"])
//!     .with_debounce(Duration::from_millis(500))
//!     .build();
//!
//! let mut errors = schedule
//!     .subscribe(cancel.clone(), move |job| {
//!         let orders = orders.clone();
//!         async move {
//!             job.apply(&mut *orders.lock().await).await?;
//!             Ok(())
//!         }
//!     }, SubscribeOptions::new())
//!     .await?;
//!
//! while let Some(err) = errors.recv().await {
//!     tracing::warn!(error = %err, "projection error");
//! }
//! ```

use crate::config::DebounceConfig;
use crate::error::{ProjectorError, Result};
use crate::job::Job;
use crate::schedule::debounce::DebounceEngine;
use crate::schedule::{ApplyFn, Schedule};
use crate::subscription::SubscribeOptions;
use crate::trigger::Trigger;
use azoth_core::{EventBus, EventStore};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Builder for [`Continuous`]
pub struct ContinuousBuilder {
    bus: Arc<dyn EventBus>,
    schedule: Schedule,
    config: DebounceConfig,
}

impl ContinuousBuilder {
    /// Coalesce events arriving within `debounce` of each other into one job.
    ///
    /// Zero (the default) creates one job per event.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.config = self.config.with_debounce(debounce);
        self
    }

    /// Bound how long debouncing may defer a job. Zero disables the cap.
    pub fn with_debounce_cap(mut self, cap: Duration) -> Self {
        self.config = self.config.with_debounce_cap(cap);
        self
    }

    /// Replace the whole debounce configuration, e.g. one read from a file.
    pub fn with_config(mut self, config: DebounceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Continuous {
        Continuous {
            schedule: Arc::new(self.schedule),
            bus: self.bus,
            config: self.config,
        }
    }
}

/// Schedule that creates projection jobs from events published on a bus
///
/// Cloning is cheap. Clones share the trigger registrations, so a trigger
/// sent through any clone reaches subscriptions started from every clone.
#[derive(Clone)]
pub struct Continuous {
    schedule: Arc<Schedule>,
    bus: Arc<dyn EventBus>,
    config: DebounceConfig,
}

impl Continuous {
    /// Start building a schedule for the events named `event_names`.
    ///
    /// `store` backs startup and triggered jobs; debounced jobs only see
    /// the events of their batch.
    pub fn builder<I, S>(
        bus: Arc<dyn EventBus>,
        store: Arc<dyn EventStore>,
        event_names: I,
    ) -> ContinuousBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ContinuousBuilder {
            bus,
            schedule: Schedule::new(store, event_names),
            config: DebounceConfig::default(),
        }
    }

    /// Schedule with the default configuration (no debounce).
    pub fn new<I, S>(bus: Arc<dyn EventBus>, store: Arc<dyn EventStore>, event_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::builder(bus, store, event_names).build()
    }

    pub fn config(&self) -> &DebounceConfig {
        &self.config
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Manually trigger a job in every live subscription.
    pub async fn trigger(&self, cancel: &CancellationToken, trigger: Trigger) -> Result<()> {
        self.schedule.trigger(cancel, trigger).await
    }

    /// Number of live subscriptions accepting triggers.
    pub fn trigger_registrations(&self) -> usize {
        self.schedule.trigger_registrations()
    }

    /// Subscribe to the schedule's events and apply `apply` to every job.
    ///
    /// Returns once the subscription runs (and the startup job, if any,
    /// was applied). Errors that do not end the subscription arrive on the
    /// returned receiver, which closes when the subscription terminates:
    /// after `cancel` fires, or after the event feed is exhausted and
    /// every queued job was applied.
    ///
    /// Fails if the bus rejects the subscription or the startup job fails.
    /// No job is applied after such a failure.
    pub async fn subscribe<F, Fut>(
        &self,
        cancel: CancellationToken,
        apply: F,
        options: SubscribeOptions,
    ) -> Result<mpsc::Receiver<ProjectorError>>
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let names = self.schedule.event_names().to_vec();
        info!(
            events = ?names,
            debounce = ?self.config.debounce(),
            cap = ?self.config.effective_cap(),
            "Starting continuous subscription"
        );

        let feed = self
            .bus
            .subscribe(cancel.clone(), &names)
            .await
            .map_err(|source| ProjectorError::Subscribe {
                names: names.clone(),
                source,
            })?;

        let apply: ApplyFn = Arc::new(move |job: Job| -> BoxFuture<'static, anyhow::Result<()>> {
            apply(job).boxed()
        });

        let (out_tx, out_rx) = mpsc::channel(1);
        let (jobs_tx, jobs_rx) = mpsc::channel(1);
        let (handle, triggers) = self.schedule.new_triggers();
        let (done_tx, done_rx) = oneshot::channel::<()>();

        // Runs on completion, or once `done_tx` is dropped without
        // completing (startup failure).
        let schedule = Arc::clone(&self.schedule);
        tokio::spawn(async move {
            let _ = done_rx.await;
            schedule.remove_triggers(handle);
            info!(events = ?schedule.event_names(), "Continuous subscription terminated");
        });

        if let Some(startup) = &options.startup {
            debug!(events = ?names, "Applying startup job before listening");
            self.schedule.apply_startup_job(startup, &apply).await?;
        }

        let feed_closed = CancellationToken::new();

        let engine = DebounceEngine::new(&self.config, cancel.clone(), jobs_tx.clone());
        let events_task = tokio::spawn({
            let out = out_tx.clone();
            let closed = feed_closed.clone().drop_guard();
            async move {
                engine.run(feed, out).await;
                drop(closed);
            }
        });

        let triggers_task = tokio::spawn(Arc::clone(&self.schedule).handle_triggers(
            cancel.clone(),
            feed_closed,
            triggers,
            jobs_tx.clone(),
        ));

        tokio::spawn(Schedule::apply_jobs(
            apply,
            cancel.clone(),
            jobs_rx,
            out_tx,
            done_tx,
        ));

        // Closes the job channel once nothing can produce jobs anymore.
        tokio::spawn(async move {
            let (events, triggers) = tokio::join!(events_task, triggers_task);
            for (task, result) in [("events", events), ("triggers", triggers)] {
                if let Err(err) = result {
                    error!(task, error = %err, "Subscription task failed");
                }
            }

            drop(jobs_tx);
            debug!("Draining projection jobs");
        });

        info!(events = ?names, "Continuous subscription running");
        Ok(out_rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use azoth_core::{MemoryBus, MemoryStore};

    fn bus_and_store() -> (Arc<dyn EventBus>, Arc<dyn EventStore>) {
        (Arc::new(MemoryBus::new()), Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_builder_options_compose() {
        let (bus, store) = bus_and_store();
        let schedule = Continuous::builder(bus, store, ["foo"])
            .with_debounce(Duration::from_secs(3))
            .with_debounce_cap(Duration::from_secs(4))
            .with_debounce(Duration::from_secs(1))
            .build();

        assert_eq!(schedule.config().debounce(), Duration::from_secs(1));
        assert_eq!(schedule.config().effective_cap(), Duration::from_secs(4));
        assert_eq!(schedule.schedule().event_names(), ["foo"]);
    }

    #[test]
    fn test_with_config_replaces_previous_options() {
        let (bus, store) = bus_and_store();
        let schedule = Continuous::builder(bus, store, ["foo"])
            .with_debounce_cap(Duration::from_secs(10))
            .with_config(DebounceConfig::new().with_debounce(Duration::from_secs(3)))
            .build();

        assert!(!schedule.config().cap_overridden);
        assert_eq!(schedule.config().effective_cap(), Duration::from_secs(6));
    }

    #[test]
    fn test_default_schedule_has_no_debounce() {
        let (bus, store) = bus_and_store();
        let schedule = Continuous::new(bus, store, ["foo", "bar"]);

        assert_eq!(schedule.config(), &DebounceConfig::default());
        assert_eq!(schedule.trigger_registrations(), 0);
    }
}
