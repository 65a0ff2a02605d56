//! Optional metrics instrumentation for projection schedules.
//!
//! When the `observe` feature is enabled, schedules emit counters and
//! histograms via the [`metrics`] crate. A downstream application must
//! install a metrics recorder (e.g. `metrics-exporter-prometheus`) to
//! collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record a projection job being handed to the apply loop.
///
/// - `azoth.projection.jobs_created_total` – counter
/// - `azoth.projection.job_events` – histogram of events per job
#[inline]
pub fn record_job_created(events: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("azoth.projection.jobs_created_total").increment(1);
        metrics::histogram!("azoth.projection.job_events").record(events as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = events;
    }
}

/// Record one run of the caller's apply function.
///
/// - `azoth.projection.jobs_applied_total` – counter with `outcome` label
/// - `azoth.projection.apply_duration_seconds` – histogram
#[inline]
pub fn record_job_applied(duration: std::time::Duration, success: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if success { "ok" } else { "fail" };
        metrics::counter!("azoth.projection.jobs_applied_total", "outcome" => outcome)
            .increment(1);
        metrics::histogram!("azoth.projection.apply_duration_seconds")
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, success);
    }
}

/// Record an error received from a bus subscription's error feed.
///
/// - `azoth.projection.feed_errors_total` – counter
#[inline]
pub fn record_feed_error() {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("azoth.projection.feed_errors_total").increment(1);
    }
}
