//! Shared infrastructure utilities for the fail-safe workspace.
//!
//! - **`atomic_write`**: crash-safe file replacement and removal (temp + rename)

pub mod atomic_write;

pub use atomic_write::{
    AtomicWriteOptions, FileSyncPolicy, ParentDirSyncPolicy, PersistMode, atomic_remove,
    atomic_write_with_options, recover_bak_file,
};
