use failsafe_storage::StorageError;
use failsafe_types::FailSafeTimer;

use crate::platform::PlatformError;
use crate::tlv::TlvError;

#[derive(Debug, thiserror::Error)]
pub enum FailSafeError {
    /// A required collaborator was not supplied.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The operation is not allowed in the current state.
    #[error("incorrect state: {0}")]
    IncorrectState(&'static str),
    /// The encoded marker outgrew its reserved size.
    #[error("marker record needs {needed} bytes but only {capacity} are reserved")]
    BufferTooSmall { needed: usize, capacity: usize },
    #[error("marker storage failed: {0}")]
    Storage(#[from] StorageError),
    #[error("marker record is malformed: {0}")]
    Codec(#[from] TlvError),
    #[error("failed to start {} timer: {source}", timer.as_str())]
    Timer {
        timer: FailSafeTimer,
        #[source]
        source: PlatformError,
    },
}
