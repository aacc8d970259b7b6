//! Values exchanged between the fail-safe guard and its collaborators.
//!
//! Each of these replaces an untyped callback/context pair: timers are named
//! by [`TimerKey`], deferred calls by [`ScheduledWork`], and application
//! notifications by [`DeviceEvent`].

use serde::Serialize;

use crate::{FabricIndex, OwnerId};

/// Notification delivered to the application layer through the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// The fail-safe expired (timer or forced). The application rolls back
    /// whatever the flags say was applied for `fabric_index`.
    FailSafeTimerExpired {
        fabric_index: FabricIndex,
        add_noc_command_invoked: bool,
        update_noc_command_invoked: bool,
    },
    /// The server is about to stop its event loop.
    ServerShuttingDown,
}

/// The two timers a fail-safe context runs concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailSafeTimer {
    /// Bounds a single arm request; restarted on every re-arm.
    ArmAttempt,
    /// Bounds the whole commissioning session; started once per session.
    MaxCumulative,
}

impl FailSafeTimer {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ArmAttempt => "arm_attempt",
            Self::MaxCumulative => "max_cumulative",
        }
    }
}

/// Identity of a pending timer: which timer, owned by whom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerKey {
    pub owner: OwnerId,
    pub timer: FailSafeTimer,
}

impl TimerKey {
    #[must_use]
    pub const fn new(owner: OwnerId, timer: FailSafeTimer) -> Self {
        Self { owner, timer }
    }
}

/// A deferred call enqueued on the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledWork {
    /// Complete an expiry by disarming the owning fail-safe.
    DisarmFailSafe { owner: OwnerId },
}

/// Why a component asks the low-power controller to stay fully awake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepActiveReason {
    FailSafeArmed,
}

impl KeepActiveReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FailSafeArmed => "fail_safe_armed",
        }
    }
}
