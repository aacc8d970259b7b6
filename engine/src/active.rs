use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use failsafe_core::ActiveNotifier;
use failsafe_types::KeepActiveReason;
use tracing::{info, warn};

/// Counts outstanding keep-active requests per reason.
///
/// Clones share the same counters, so the server can hand one to the guard
/// and keep another for inspection.
#[derive(Debug, Clone, Default)]
pub struct ActiveModeTracker {
    requests: Rc<RefCell<BTreeMap<KeepActiveReason, u32>>>,
}

impl ActiveModeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any component currently needs the device fully awake.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.requests.borrow().values().any(|count| *count > 0)
    }

    #[must_use]
    pub fn requests(&self, reason: KeepActiveReason) -> u32 {
        self.requests.borrow().get(&reason).copied().unwrap_or(0)
    }
}

impl ActiveNotifier for ActiveModeTracker {
    fn notify_active_required(&mut self, reason: KeepActiveReason, active: bool) {
        let was_active = self.is_active();
        {
            let mut requests = self.requests.borrow_mut();
            let count = requests.entry(reason).or_default();
            if active {
                *count = count.saturating_add(1);
            } else if *count == 0 {
                warn!(reason = reason.as_str(), "Keep-active release without a request");
            } else {
                *count -= 1;
            }
        }

        match (was_active, self.is_active()) {
            (false, true) => info!(reason = reason.as_str(), "Entering active mode"),
            (true, false) => info!(reason = reason.as_str(), "Returning to idle mode"),
            _ => {}
        }
    }
}
