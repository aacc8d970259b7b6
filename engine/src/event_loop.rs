//! Single-threaded cooperative event loop with a virtual clock.
//!
//! Everything the fail-safe schedules lands on one FIFO queue: posted device
//! events, deferred work, and timers whose deadline has passed. Time only
//! moves when the owner calls [`EventLoop::advance`] (or the real-time driver
//! does it for them), which keeps every transition deterministic in tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use failsafe_core::{EventPoster, PlatformError, TimerService};
use failsafe_types::{DeviceEvent, ScheduledWork, TimerKey};
use tracing::{debug, trace};

/// One unit of work waiting on the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopItem {
    Event(DeviceEvent),
    Work(ScheduledWork),
    Timer(TimerKey),
}

/// Capacity bounds. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopLimits {
    /// Posted events and scheduled work beyond this depth are refused.
    /// Expired timers are always enqueued.
    pub max_queue_depth: Option<usize>,
    pub max_timers: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct PendingTimer {
    deadline: Duration,
    seq: u64,
}

#[derive(Debug, Default)]
pub struct EventLoop {
    now: Duration,
    queue: VecDeque<LoopItem>,
    timers: HashMap<TimerKey, PendingTimer>,
    next_seq: u64,
    limits: LoopLimits,
    stopped: bool,
}

impl EventLoop {
    #[must_use]
    pub fn new(limits: LoopLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Time elapsed on the loop clock since creation.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.now
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn is_timer_pending(&self, key: TimerKey) -> bool {
        self.timers.contains_key(&key)
    }

    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Earliest pending deadline, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.values().map(|timer| timer.deadline).min()
    }

    /// Take the next queued item.
    pub fn pop(&mut self) -> Option<LoopItem> {
        self.queue.pop_front()
    }

    /// Move the clock forward by `by` and enqueue every timer that is due.
    pub fn advance(&mut self, by: Duration) {
        self.advance_to(self.now.saturating_add(by));
    }

    /// Move the clock to `instant` (never backwards) and enqueue every
    /// timer that is due, earliest deadline first.
    pub fn advance_to(&mut self, instant: Duration) {
        if instant > self.now {
            self.now = instant;
        }

        let mut due: Vec<(TimerKey, PendingTimer)> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.deadline <= self.now)
            .map(|(key, timer)| (*key, *timer))
            .collect();
        due.sort_by_key(|(_, timer)| (timer.deadline, timer.seq));

        for (key, _) in due {
            self.timers.remove(&key);
            trace!(owner = %key.owner, timer = key.timer.as_str(), "Timer due");
            self.queue.push_back(LoopItem::Timer(key));
        }
    }

    /// Refuse further posts, scheduled work and timers, and drop pending
    /// timers. Items already queued can still be drained.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.timers.clear();
        debug!(queued = self.queue.len(), "Event loop stopped");
    }

    fn enqueue(&mut self, item: LoopItem) -> Result<(), PlatformError> {
        if self.stopped {
            return Err(PlatformError::LoopStopped);
        }
        if let Some(capacity) = self.limits.max_queue_depth
            && self.queue.len() >= capacity
        {
            return Err(PlatformError::QueueFull { capacity });
        }
        self.queue.push_back(item);
        Ok(())
    }
}

impl TimerService for EventLoop {
    fn start_timer(&mut self, delay: Duration, key: TimerKey) -> Result<(), PlatformError> {
        if self.stopped {
            return Err(PlatformError::LoopStopped);
        }
        if let Some(capacity) = self.limits.max_timers
            && !self.timers.contains_key(&key)
            && self.timers.len() >= capacity
        {
            return Err(PlatformError::TimerPoolExhausted { capacity });
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let deadline = self.now.saturating_add(delay);
        self.timers.insert(key, PendingTimer { deadline, seq });
        debug!(
            owner = %key.owner,
            timer = key.timer.as_str(),
            deadline_ms = deadline.as_millis(),
            "Timer started"
        );
        Ok(())
    }

    fn cancel_timer(&mut self, key: TimerKey) {
        if self.timers.remove(&key).is_some() {
            debug!(owner = %key.owner, timer = key.timer.as_str(), "Timer cancelled");
        }
    }
}

impl EventPoster for EventLoop {
    fn post_event(&mut self, event: DeviceEvent) -> Result<(), PlatformError> {
        self.enqueue(LoopItem::Event(event))
    }

    fn schedule_work(&mut self, work: ScheduledWork) -> Result<(), PlatformError> {
        self.enqueue(LoopItem::Work(work))
    }
}

/// Shared handle to an [`EventLoop`].
///
/// The guard holds one as its timer and event collaborator while the server
/// holds another to drain the queue. Every method borrows only for the
/// duration of the call.
#[derive(Debug, Clone, Default)]
pub struct LoopHandle(Rc<RefCell<EventLoop>>);

impl LoopHandle {
    #[must_use]
    pub fn new(event_loop: EventLoop) -> Self {
        Self(Rc::new(RefCell::new(event_loop)))
    }

    /// Run `f` with shared access to the loop.
    pub fn with<R>(&self, f: impl FnOnce(&EventLoop) -> R) -> R {
        f(&self.0.borrow())
    }

    /// Run `f` with exclusive access to the loop.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut EventLoop) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }

    pub fn pop(&self) -> Option<LoopItem> {
        self.0.borrow_mut().pop()
    }
}

impl TimerService for LoopHandle {
    fn start_timer(&mut self, delay: Duration, key: TimerKey) -> Result<(), PlatformError> {
        self.0.borrow_mut().start_timer(delay, key)
    }

    fn cancel_timer(&mut self, key: TimerKey) {
        self.0.borrow_mut().cancel_timer(key);
    }
}

impl EventPoster for LoopHandle {
    fn post_event(&mut self, event: DeviceEvent) -> Result<(), PlatformError> {
        self.0.borrow_mut().post_event(event)
    }

    fn schedule_work(&mut self, work: ScheduledWork) -> Result<(), PlatformError> {
        self.0.borrow_mut().schedule_work(work)
    }
}
