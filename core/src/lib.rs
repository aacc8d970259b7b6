//! Commissioning fail-safe logic.
//!
//! This crate holds the guard state machine, the persisted marker and its
//! binary codec, and boot recovery. It performs no scheduling of its own:
//! timers, event posting and power hints go through the traits in
//! [`platform`], which the engine implements on its event loop.

mod context;
mod error;
pub mod marker;
pub mod platform;
mod recovery;
pub mod tlv;

pub use context::{DEFAULT_MAX_CUMULATIVE, FailSafeConfig, FailSafeContext, InitParams};
pub use error::FailSafeError;
pub use marker::{
    FAIL_SAFE_MARKER_KEY, MARKER_MAX_ENCODED_LEN, MarkerStore, decode_marker, encode_marker,
};
pub use platform::{ActiveNotifier, EventPoster, PlatformError, TimerService};
pub use recovery::BootRecovery;
