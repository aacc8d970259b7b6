//! The commissioning fail-safe guard.
//!
//! A [`FailSafeContext`] is armed while a commissioner applies changes that
//! must be rolled back unless explicitly committed. Two timers bound the
//! session: the per-attempt timer, restarted on every arm request, and the
//! cumulative timer, started once when the session begins. Whichever fires
//! first (or a forced expiry) runs the single expiry path, which posts a
//! [`DeviceEvent::FailSafeTimerExpired`] and schedules the disarm that ends
//! the session.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use failsafe_storage::PersistentStorage;
use failsafe_types::{
    DeviceEvent, FabricIndex, FailSafeState, FailSafeTimer, KeepActiveReason, OwnerId,
    ScheduledWork, TimerKey,
};
use tracing::{debug, error, info, warn};

use crate::error::FailSafeError;
use crate::marker::MarkerStore;
use crate::platform::{ActiveNotifier, EventPoster, TimerService};

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

/// Default upper bound on a whole commissioning session.
pub const DEFAULT_MAX_CUMULATIVE: Duration = Duration::from_secs(900);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailSafeConfig {
    /// Duration of the cumulative timer.
    pub max_cumulative: Duration,
}

impl Default for FailSafeConfig {
    fn default() -> Self {
        Self {
            max_cumulative: DEFAULT_MAX_CUMULATIVE,
        }
    }
}

/// Collaborators supplied after construction.
#[derive(Default)]
pub struct InitParams {
    pub storage: Option<Arc<dyn PersistentStorage>>,
}

pub struct FailSafeContext {
    id: OwnerId,
    config: FailSafeConfig,
    markers: MarkerStore,
    timers: Box<dyn TimerService>,
    events: Box<dyn EventPoster>,
    active_notifier: Option<Box<dyn ActiveNotifier>>,
    armed: bool,
    busy: bool,
    fabric_index: FabricIndex,
    add_noc_invoked: bool,
    update_noc_invoked: bool,
}

impl fmt::Debug for FailSafeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailSafeContext")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("fabric_index", &self.fabric_index)
            .field("add_noc_invoked", &self.add_noc_invoked)
            .field("update_noc_invoked", &self.update_noc_invoked)
            .finish_non_exhaustive()
    }
}

impl FailSafeContext {
    /// Create a disarmed guard. Marker storage arrives later through
    /// [`FailSafeContext::init`].
    #[must_use]
    pub fn new(
        config: FailSafeConfig,
        timers: Box<dyn TimerService>,
        events: Box<dyn EventPoster>,
        active_notifier: Option<Box<dyn ActiveNotifier>>,
    ) -> Self {
        Self {
            id: OwnerId::new(NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed)),
            config,
            markers: MarkerStore::new(),
            timers,
            events,
            active_notifier,
            armed: false,
            busy: false,
            fabric_index: FabricIndex::UNDEFINED,
            add_noc_invoked: false,
            update_noc_invoked: false,
        }
    }

    pub fn init(&mut self, params: InitParams) -> Result<(), FailSafeError> {
        let storage = params
            .storage
            .ok_or(FailSafeError::InvalidArgument("persistent storage is required"))?;
        self.markers.set_storage(storage);
        Ok(())
    }

    /// Process-unique id carried by every timer and work item this guard
    /// schedules.
    #[must_use]
    pub fn id(&self) -> OwnerId {
        self.id
    }

    #[must_use]
    pub fn config(&self) -> FailSafeConfig {
        self.config
    }

    #[must_use]
    pub fn markers(&self) -> &MarkerStore {
        &self.markers
    }

    /// Arm, or re-arm, for `fabric_index`.
    ///
    /// The first arm of a session also starts the cumulative timer. A
    /// re-arm restarts only the per-attempt timer. On error nothing changes.
    pub fn arm_fail_safe(
        &mut self,
        fabric_index: FabricIndex,
        expiry: Duration,
    ) -> Result<(), FailSafeError> {
        if self.busy {
            return Err(FailSafeError::IncorrectState(
                "fail-safe cleanup is still in progress",
            ));
        }

        let fresh_session = !self.armed;
        if fresh_session {
            self.start_timer(FailSafeTimer::MaxCumulative, self.config.max_cumulative)?;
        }

        if let Err(err) = self.start_timer(FailSafeTimer::ArmAttempt, expiry) {
            if fresh_session {
                self.cancel_timers();
            }
            return Err(err);
        }

        self.set_armed(true);
        self.fabric_index = fabric_index;
        info!(
            fabric_index = %fabric_index,
            expiry_secs = expiry.as_secs(),
            fresh_session,
            "Fail-safe armed"
        );
        Ok(())
    }

    /// Cancel both timers and return to the initial state.
    pub fn disarm_fail_safe(&mut self) {
        self.cancel_timers();
        self.reset_state();
        info!("Fail-safe cleanly disarmed");
    }

    /// Expire immediately, as if a timer had fired. No-op when not armed.
    pub fn force_fail_safe_timer_expiry(&mut self) {
        if !self.armed {
            return;
        }
        self.cancel_timers();
        self.fail_safe_timer_expired();
    }

    /// Deliver a timer that fired on the event loop.
    pub fn handle_timer(&mut self, key: TimerKey) {
        if key.owner != self.id {
            debug!(owner = %key.owner, timer = key.timer.as_str(), "Ignoring timer of another guard");
            return;
        }
        debug!(timer = key.timer.as_str(), "Fail-safe timer fired");
        self.fail_safe_timer_expired();
    }

    /// Run deferred work this guard scheduled.
    pub fn handle_work(&mut self, work: ScheduledWork) {
        match work {
            ScheduledWork::DisarmFailSafe { owner } if owner == self.id => {
                self.disarm_fail_safe();
            }
            ScheduledWork::DisarmFailSafe { owner } => {
                debug!(%owner, "Ignoring disarm work of another guard");
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> FailSafeState {
        if self.armed {
            FailSafeState::Armed
        } else if self.busy {
            FailSafeState::ExpiringBusy
        } else {
            FailSafeState::Disarmed
        }
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Armed and tracking `fabric_index`.
    #[must_use]
    pub fn is_armed_for(&self, fabric_index: FabricIndex) -> bool {
        self.armed && self.fabric_index == fabric_index
    }

    #[must_use]
    pub fn fabric_index(&self) -> FabricIndex {
        self.fabric_index
    }

    #[must_use]
    pub fn add_noc_command_invoked(&self) -> bool {
        self.add_noc_invoked
    }

    pub fn set_add_noc_command_invoked(&mut self, invoked: bool) {
        self.add_noc_invoked = invoked;
    }

    #[must_use]
    pub fn update_noc_command_invoked(&self) -> bool {
        self.update_noc_invoked
    }

    pub fn set_update_noc_command_invoked(&mut self, invoked: bool) {
        self.update_noc_invoked = invoked;
    }

    /// Enter the armed state from a persisted marker. Only boot recovery
    /// does this; it never starts timers. Returns `false`, changing nothing,
    /// unless the guard is disarmed.
    pub(crate) fn arm_from_marker(&mut self, fabric_index: FabricIndex) -> bool {
        if self.armed || self.busy {
            warn!(state = ?self.state(), "Refusing to arm from marker while active");
            return false;
        }
        self.set_armed(true);
        self.fabric_index = fabric_index;
        self.add_noc_invoked = true;
        self.update_noc_invoked = false;
        true
    }

    fn fail_safe_timer_expired(&mut self) {
        // Stale timer queued before a disarm or an earlier expiry.
        if !self.armed {
            return;
        }
        info!(fabric_index = %self.fabric_index, "Fail-safe timer expired");
        self.schedule_cleanup();
    }

    fn schedule_cleanup(&mut self) {
        // Not armed but busy: re-arming is refused until the disarm runs.
        self.busy = true;
        self.set_armed(false);

        let event = DeviceEvent::FailSafeTimerExpired {
            fabric_index: self.fabric_index,
            add_noc_command_invoked: self.add_noc_invoked,
            update_noc_command_invoked: self.update_noc_invoked,
        };
        if let Err(err) = self.events.post_event(event) {
            error!("Failed to post fail-safe timer expired: {err}");
        }

        if let Err(err) = self
            .events
            .schedule_work(ScheduledWork::DisarmFailSafe { owner: self.id })
        {
            warn!("Failed to schedule fail-safe disarm, guard stays busy until disarmed: {err}");
        }
    }

    fn set_armed(&mut self, armed: bool) {
        if self.armed != armed
            && let Some(notifier) = self.active_notifier.as_mut()
        {
            notifier.notify_active_required(KeepActiveReason::FailSafeArmed, armed);
        }
        self.armed = armed;
    }

    fn reset_state(&mut self) {
        self.set_armed(false);
        self.busy = false;
        self.fabric_index = FabricIndex::UNDEFINED;
        self.add_noc_invoked = false;
        self.update_noc_invoked = false;
    }

    fn start_timer(&mut self, timer: FailSafeTimer, delay: Duration) -> Result<(), FailSafeError> {
        self.timers
            .start_timer(delay, TimerKey::new(self.id, timer))
            .map_err(|source| FailSafeError::Timer { timer, source })
    }

    fn cancel_timers(&mut self) {
        self.timers
            .cancel_timer(TimerKey::new(self.id, FailSafeTimer::ArmAttempt));
        self.timers
            .cancel_timer(TimerKey::new(self.id, FailSafeTimer::MaxCumulative));
    }
}
