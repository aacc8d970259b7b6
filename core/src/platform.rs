//! Collaborator interfaces the fail-safe consumes.
//!
//! The context never reaches for a global event loop; whoever owns it hands
//! these in at construction.

use std::time::Duration;

use failsafe_types::{DeviceEvent, KeepActiveReason, ScheduledWork, TimerKey};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("event loop is stopped")]
    LoopStopped,
    #[error("event queue is full ({capacity} items)")]
    QueueFull { capacity: usize },
    #[error("no timer slots left ({capacity} in use)")]
    TimerPoolExhausted { capacity: usize },
}

/// One-shot timers keyed by [`TimerKey`].
pub trait TimerService {
    /// Start (or restart) the timer for `key`.
    fn start_timer(&mut self, delay: Duration, key: TimerKey) -> Result<(), PlatformError>;

    /// Cancel `key`. Cancelling a timer that is not pending is a no-op.
    fn cancel_timer(&mut self, key: TimerKey);
}

/// Posting onto the serialized event loop.
pub trait EventPoster {
    /// Deliver `event` to the application on a later loop turn.
    fn post_event(&mut self, event: DeviceEvent) -> Result<(), PlatformError>;

    /// Run `work` on a later loop turn, after anything already posted.
    fn schedule_work(&mut self, work: ScheduledWork) -> Result<(), PlatformError>;
}

/// Low-power controller hook: keep the device fully awake while requested.
pub trait ActiveNotifier {
    fn notify_active_required(&mut self, reason: KeepActiveReason, active: bool);
}
