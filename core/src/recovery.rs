//! Boot-time crash recovery from a persisted marker.
//!
//! A marker that survives a reboot means a non-atomic commit was cut short.
//! Recovery arms the guard for the recorded fabric and expires it at once,
//! so the application rolls back through the ordinary expiry path.
//!
//! Recovery assumes the interrupted commit was adding a fabric: the add-NOC
//! flag is set and the update-NOC flag cleared. Interrupted updates of an
//! existing fabric are guarded by the fabric table's own commit marker.

use failsafe_types::{FailSafeState, Marker};
use tracing::{error, warn};

use crate::context::FailSafeContext;
use crate::error::FailSafeError;

/// What boot recovery found.
#[derive(Debug)]
pub enum BootRecovery {
    /// No marker was persisted.
    Clean,
    /// A marker was found and the guard expired for its fabric.
    Recovered(Marker),
    /// The marker could not be read. The guard was left untouched.
    Unreadable(FailSafeError),
    /// The guard was already armed or cleaning up. The marker was not read.
    Skipped,
}

impl BootRecovery {
    #[must_use]
    pub fn recovered(&self) -> Option<Marker> {
        match self {
            Self::Recovered(marker) => Some(*marker),
            Self::Clean | Self::Unreadable(_) | Self::Skipped => None,
        }
    }
}

impl FailSafeContext {
    /// Look for a marker left by an interrupted commit and trigger cleanup
    /// for it. Run once, after [`FailSafeContext::init`]; later calls made
    /// while a session or its cleanup is active are skipped.
    pub fn check_marker(&mut self) -> BootRecovery {
        if self.state() != FailSafeState::Disarmed {
            warn!(state = ?self.state(), "Fail-safe already active, skipping marker check");
            return BootRecovery::Skipped;
        }
        match self.markers().load() {
            Ok(None) => BootRecovery::Clean,
            Ok(Some(marker)) => {
                warn!(
                    fabric_index = %marker.fabric_index,
                    "Found a fail-safe marker, preparing cleanup"
                );
                if self.arm_from_marker(marker.fabric_index) {
                    self.force_fail_safe_timer_expiry();
                }
                BootRecovery::Recovered(marker)
            }
            Err(err) => {
                error!("Error loading fail-safe marker, leaving state untouched: {err}");
                BootRecovery::Unreadable(err)
            }
        }
    }
}
