//! Debounce configuration for continuous schedules.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The largest debounce for which [`DEFAULT_DEBOUNCE_CAP`] is used as the
/// cap. Longer debounce windows get a cap of twice the window instead.
/// Ignored once the cap is set explicitly.
pub const DEFAULT_DEBOUNCE_BARRIER: Duration = Duration::from_millis(2500);

/// Cap used when none is set explicitly and the debounce is at most
/// [`DEFAULT_DEBOUNCE_BARRIER`].
pub const DEFAULT_DEBOUNCE_CAP: Duration = Duration::from_secs(5);

/// Compute the effective debounce cap.
///
/// - A zero cap disables capping.
/// - An explicitly set cap is used as is.
/// - Otherwise the default cap is used for debounce windows up to 2.5s,
///   and twice the debounce window beyond that.
pub fn compute_debounce_cap(
    debounce: Duration,
    debounce_cap: Duration,
    cap_overridden: bool,
) -> Duration {
    if debounce_cap.is_zero() {
        return Duration::ZERO;
    }

    if cap_overridden {
        return debounce_cap;
    }

    if debounce <= DEFAULT_DEBOUNCE_BARRIER {
        return DEFAULT_DEBOUNCE_CAP;
    }

    debounce.saturating_mul(2)
}

/// Debounce settings of a continuous schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceConfig {
    /// Quiet period after the last event before a job is created
    /// Default: 0 (one job per event)
    #[serde(default)]
    pub debounce_ms: u64,

    /// Upper bound on how long debouncing may defer a job
    /// Default: 5000; 0 disables the cap
    #[serde(default = "default_debounce_cap_ms")]
    pub debounce_cap_ms: u64,

    /// Whether `debounce_cap_ms` was chosen explicitly. When false the
    /// cap follows the debounce window (see [`compute_debounce_cap`]).
    #[serde(default)]
    pub cap_overridden: bool,
}

fn default_debounce_cap_ms() -> u64 {
    to_millis(DEFAULT_DEBOUNCE_CAP)
}

/// Whole milliseconds, rounded up so a positive duration never becomes
/// zero. Saturates at `u64::MAX`.
fn to_millis(duration: Duration) -> u64 {
    let millis = duration.as_nanos().div_ceil(1_000_000);
    u64::try_from(millis).unwrap_or(u64::MAX)
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 0,
            debounce_cap_ms: default_debounce_cap_ms(),
            cap_overridden: false,
        }
    }
}

impl DebounceConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debounce window.
    ///
    /// Stored in whole milliseconds; a positive sub-millisecond window
    /// rounds up to 1ms.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = to_millis(debounce);
        self
    }

    /// Set the debounce cap explicitly.
    pub fn with_debounce_cap(mut self, cap: Duration) -> Self {
        self.debounce_cap_ms = to_millis(cap);
        self.cap_overridden = true;
        self
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn debounce_cap(&self) -> Duration {
        Duration::from_millis(self.debounce_cap_ms)
    }

    /// The cap actually armed alongside each debounce timer.
    pub fn effective_cap(&self) -> Duration {
        compute_debounce_cap(self.debounce(), self.debounce_cap(), self.cap_overridden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_cap_heuristic() {
        assert_eq!(compute_debounce_cap(secs(1), secs(5), false), secs(5));
        assert_eq!(compute_debounce_cap(secs(3), secs(5), false), secs(6));
        assert_eq!(compute_debounce_cap(secs(3), secs(10), true), secs(10));
        assert_eq!(compute_debounce_cap(secs(1), Duration::ZERO, false), Duration::ZERO);
    }

    #[test]
    fn test_cap_heuristic_barrier_is_inclusive() {
        assert_eq!(
            compute_debounce_cap(DEFAULT_DEBOUNCE_BARRIER, DEFAULT_DEBOUNCE_CAP, false),
            DEFAULT_DEBOUNCE_CAP
        );
        assert_eq!(
            compute_debounce_cap(Duration::from_millis(2501), DEFAULT_DEBOUNCE_CAP, false),
            Duration::from_millis(5002)
        );
    }

    #[test]
    fn test_zero_cap_wins_over_override() {
        assert_eq!(compute_debounce_cap(secs(1), Duration::ZERO, true), Duration::ZERO);
    }

    #[test]
    fn test_builder_last_write_wins() {
        let config = DebounceConfig::new()
            .with_debounce(secs(1))
            .with_debounce(secs(3))
            .with_debounce_cap(secs(4))
            .with_debounce_cap(secs(10));

        assert_eq!(config.debounce(), secs(3));
        assert_eq!(config.debounce_cap(), secs(10));
        assert!(config.cap_overridden);
        assert_eq!(config.effective_cap(), secs(10));
    }

    #[test]
    fn test_defaults() {
        let config = DebounceConfig::default();
        assert_eq!(config.debounce(), Duration::ZERO);
        assert_eq!(config.debounce_cap(), DEFAULT_DEBOUNCE_CAP);
        assert!(!config.cap_overridden);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: DebounceConfig = serde_json::from_str(r#"{"debounce_ms": 3000}"#).unwrap();
        assert_eq!(config.debounce(), secs(3));
        assert_eq!(config.debounce_cap(), DEFAULT_DEBOUNCE_CAP);
        assert_eq!(config.effective_cap(), secs(6));
    }

    #[test]
    fn test_sub_millisecond_durations_stay_enabled() {
        let config = DebounceConfig::new()
            .with_debounce(Duration::from_micros(500))
            .with_debounce_cap(Duration::from_micros(900));

        assert_eq!(config.debounce(), Duration::from_millis(1));
        assert_eq!(config.debounce_cap(), Duration::from_millis(1));
        assert_eq!(config.effective_cap(), Duration::from_millis(1));

        let rounded = DebounceConfig::new().with_debounce(Duration::from_micros(1500));
        assert_eq!(rounded.debounce(), Duration::from_millis(2));
    }

    #[test]
    fn test_huge_durations_saturate() {
        let config = DebounceConfig::new().with_debounce(Duration::MAX);
        assert_eq!(config.debounce_ms, u64::MAX);
        assert_eq!(config.effective_cap(), config.debounce() * 2);

        assert_eq!(
            compute_debounce_cap(Duration::MAX, DEFAULT_DEBOUNCE_CAP, false),
            Duration::MAX
        );
    }
}
