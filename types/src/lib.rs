//! Core domain types for the commissioning fail-safe.
//!
//! This crate contains pure domain types with no IO, no async, and minimal
//! dependencies. Everything here can be used from any layer.

mod event;
mod ids;

pub use event::{DeviceEvent, FailSafeTimer, KeepActiveReason, ScheduledWork, TimerKey};
pub use ids::{FabricIndex, OwnerId};

use serde::Serialize;

/// Persisted crash-recovery record.
///
/// Written before an irreversible, non-atomic commit for `fabric_index` and
/// erased once that commit completes. Its presence at boot means the commit
/// was interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Marker {
    pub fabric_index: FabricIndex,
}

impl Marker {
    #[must_use]
    pub const fn new(fabric_index: FabricIndex) -> Self {
        Self { fabric_index }
    }
}

/// Observable state of a fail-safe context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailSafeState {
    Disarmed,
    Armed,
    /// Expiry has fired and cleanup is posted, disarm is still pending.
    /// Re-arming is refused until it completes.
    ExpiringBusy,
}

impl FailSafeState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disarmed => "disarmed",
            Self::Armed => "armed",
            Self::ExpiringBusy => "expiring_busy",
        }
    }
}
