//! Composition root: owns the storage, the event loop and the fail-safe
//! guard, and routes loop items between them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use failsafe_core::{
    ActiveNotifier, BootRecovery, EventPoster, FailSafeConfig, FailSafeContext, FailSafeError,
    InitParams,
};
use failsafe_storage::PersistentStorage;
use failsafe_types::DeviceEvent;
use tracing::{debug, error, info};

use crate::active::ActiveModeTracker;
use crate::config::DeviceConfig;
use crate::event_loop::{EventLoop, LoopHandle, LoopItem, LoopLimits};

pub struct ServerInitParams {
    /// Required. Holds the fail-safe marker.
    pub storage: Option<Arc<dyn PersistentStorage>>,
    pub fail_safe: FailSafeConfig,
    /// Replaces the built-in [`ActiveModeTracker`].
    pub active_notifier: Option<Box<dyn ActiveNotifier>>,
    pub max_queue_depth: Option<usize>,
}

impl Default for ServerInitParams {
    fn default() -> Self {
        Self {
            storage: None,
            fail_safe: FailSafeConfig::default(),
            active_notifier: None,
            max_queue_depth: None,
        }
    }
}

impl ServerInitParams {
    /// Parameters from a loaded config, with `storage` already opened.
    #[must_use]
    pub fn from_config(config: &DeviceConfig, storage: Arc<dyn PersistentStorage>) -> Self {
        Self {
            storage: Some(storage),
            fail_safe: config.fail_safe_config(),
            active_notifier: None,
            max_queue_depth: config.max_queue_depth(),
        }
    }
}

/// Application-layer consumer of device events.
pub trait DeviceEventHandler {
    fn on_event(&mut self, event: &DeviceEvent, fail_safe: &mut FailSafeContext);
}

impl<F> DeviceEventHandler for F
where
    F: FnMut(&DeviceEvent, &mut FailSafeContext),
{
    fn on_event(&mut self, event: &DeviceEvent, fail_safe: &mut FailSafeContext) {
        self(event, fail_safe);
    }
}

/// Erases the persisted marker once an expiry has been delivered.
///
/// Stands in for the commissioning layer, which removes the marker after it
/// has rolled back the interrupted commit. Register it after the handlers
/// that perform the rollback.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkerCleanup;

impl DeviceEventHandler for MarkerCleanup {
    fn on_event(&mut self, event: &DeviceEvent, fail_safe: &mut FailSafeContext) {
        if let DeviceEvent::FailSafeTimerExpired { fabric_index, .. } = event {
            info!(fabric_index = %fabric_index, "Fail-safe rollback delivered, clearing marker");
            fail_safe.markers().erase();
        }
    }
}

pub struct Server {
    storage: Arc<dyn PersistentStorage>,
    event_loop: LoopHandle,
    fail_safe: FailSafeContext,
    active_mode: Option<ActiveModeTracker>,
    handlers: Vec<Box<dyn DeviceEventHandler>>,
    boot_recovery: BootRecovery,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("fail_safe", &self.fail_safe)
            .field("handlers", &self.handlers.len())
            .field("boot_recovery", &self.boot_recovery)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Build the loop and guard, then run boot recovery.
    ///
    /// A recovered marker leaves its cleanup event queued; it is delivered by
    /// the first [`Server::run_until_idle`], after handlers are registered.
    pub fn init(params: ServerInitParams) -> Result<Self, FailSafeError> {
        let storage = params
            .storage
            .ok_or(FailSafeError::InvalidArgument("persistent storage is required"))?;

        let event_loop = LoopHandle::new(EventLoop::new(LoopLimits {
            max_queue_depth: params.max_queue_depth,
            max_timers: None,
        }));

        let (notifier, active_mode) = match params.active_notifier {
            Some(notifier) => (notifier, None),
            None => {
                let tracker = ActiveModeTracker::new();
                (
                    Box::new(tracker.clone()) as Box<dyn ActiveNotifier>,
                    Some(tracker),
                )
            }
        };

        let mut fail_safe = FailSafeContext::new(
            params.fail_safe,
            Box::new(event_loop.clone()),
            Box::new(event_loop.clone()),
            Some(notifier),
        );
        fail_safe.init(InitParams {
            storage: Some(Arc::clone(&storage)),
        })?;

        let boot_recovery = fail_safe.check_marker();
        info!(
            max_cumulative_secs = params.fail_safe.max_cumulative.as_secs(),
            recovered = boot_recovery.recovered().is_some(),
            "Server initialized"
        );

        Ok(Self {
            storage,
            event_loop,
            fail_safe,
            active_mode,
            handlers: Vec::new(),
            boot_recovery,
        })
    }

    /// Handlers run in registration order.
    pub fn add_event_handler(&mut self, handler: impl DeviceEventHandler + 'static) {
        self.handlers.push(Box::new(handler));
    }

    /// Drain the loop. Returns the device events delivered to handlers.
    pub fn run_until_idle(&mut self) -> Vec<DeviceEvent> {
        let mut dispatched = Vec::new();
        while let Some(item) = self.event_loop.pop() {
            match item {
                LoopItem::Timer(key) => self.fail_safe.handle_timer(key),
                LoopItem::Work(work) => self.fail_safe.handle_work(work),
                LoopItem::Event(event) => {
                    debug!(?event, "Dispatching device event");
                    for handler in &mut self.handlers {
                        handler.on_event(&event, &mut self.fail_safe);
                    }
                    dispatched.push(event);
                }
            }
        }
        dispatched
    }

    /// Advance the loop clock by `by`, then drain.
    pub fn advance(&mut self, by: Duration) -> Vec<DeviceEvent> {
        self.event_loop.with_mut(|event_loop| event_loop.advance(by));
        self.run_until_idle()
    }

    pub(crate) fn advance_to(&mut self, instant: Duration) -> Vec<DeviceEvent> {
        self.event_loop
            .with_mut(|event_loop| event_loop.advance_to(instant));
        self.run_until_idle()
    }

    #[must_use]
    pub fn fail_safe(&self) -> &FailSafeContext {
        &self.fail_safe
    }

    pub fn fail_safe_mut(&mut self) -> &mut FailSafeContext {
        &mut self.fail_safe
    }

    #[must_use]
    pub fn persistent_storage(&self) -> &Arc<dyn PersistentStorage> {
        &self.storage
    }

    #[must_use]
    pub fn event_loop(&self) -> &LoopHandle {
        &self.event_loop
    }

    /// The built-in tracker, unless a notifier was supplied at init.
    #[must_use]
    pub fn active_mode(&self) -> Option<&ActiveModeTracker> {
        self.active_mode.as_ref()
    }

    #[must_use]
    pub fn boot_recovery(&self) -> &BootRecovery {
        &self.boot_recovery
    }

    /// Loop-clock time since [`Server::init`].
    #[must_use]
    pub fn time_since_init(&self) -> Duration {
        self.event_loop.with(EventLoop::now)
    }

    /// Tell the application the server is about to stop.
    pub fn generate_shutdown_event(&mut self) {
        let posted = self
            .event_loop
            .with_mut(|event_loop| event_loop.post_event(DeviceEvent::ServerShuttingDown));
        if let Err(err) = posted {
            error!("Failed to post shutdown event: {err}");
        }
    }

    /// Disarm an armed guard, deliver what is queued, and stop the loop.
    ///
    /// Disarming here skips the rollback event; a marker left behind is
    /// handled by boot recovery on the next start.
    pub fn shutdown(&mut self) -> Vec<DeviceEvent> {
        if self.fail_safe.is_armed() {
            self.fail_safe.disarm_fail_safe();
        }
        let dispatched = self.run_until_idle();
        self.event_loop.with_mut(EventLoop::shutdown);
        info!("Server shut down");
        dispatched
    }
}
