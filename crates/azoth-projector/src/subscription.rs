//! Subscription options.

use crate::trigger::Trigger;

/// Options for subscribing to a schedule
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Job applied once, synchronously, before the subscription starts.
    pub startup: Option<Trigger>,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a job built from `trigger` before listening for events.
    ///
    /// Useful for catching a projection up on events published while it
    /// was not subscribed.
    pub fn startup(mut self, trigger: Trigger) -> Self {
        self.startup = Some(trigger);
        self
    }
}
