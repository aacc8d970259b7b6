//! Runtime for the commissioning fail-safe.
//!
//! Provides the cooperative event loop the guard schedules onto, the
//! keep-active tracker, file configuration, and the [`Server`] that wires
//! them together and runs boot recovery.

mod active;
mod config;
mod event_loop;
mod realtime;
mod server;

pub use active::ActiveModeTracker;
pub use config::{
    CONFIG_ENV, ConfigError, DeviceConfig, FailSafeSection, RuntimeConfig, StorageBackend,
    StorageConfig, config_path,
};
pub use event_loop::{EventLoop, LoopHandle, LoopItem, LoopLimits};
pub use server::{DeviceEventHandler, MarkerCleanup, Server, ServerInitParams};

pub use failsafe_core::{BootRecovery, FailSafeConfig, FailSafeContext, FailSafeError};
pub use failsafe_storage::{PersistentStorage, StorageError};
pub use failsafe_types::{DeviceEvent, FabricIndex, FailSafeState, Marker};
