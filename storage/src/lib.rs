//! Key-value persistence used by the fail-safe marker store.
//!
//! [`PersistentStorage`] is the collaborator interface; the backends are
//! interchangeable:
//!
//! - [`MemoryStorage`]: process-local map, for tests and ephemeral runs
//! - [`FileStorage`]: one file per key, replaced atomically
//! - [`SqliteStorage`]: a single `kv` table, WAL + `synchronous=FULL`
//!
//! All operations are synchronous and called from the event loop thread.

mod file;
mod memory;
mod secure_fs;
mod sqlite;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use std::io;
use std::path::PathBuf;

/// Longest key a backend must accept, in bytes.
pub const KEY_LENGTH_MAX: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The key has no value. Callers usually treat this as a normal outcome.
    #[error("no value stored under key {key:?}")]
    NotFound { key: String },
    #[error("invalid storage key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },
    #[error("storage IO failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("sqlite storage failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("storage lock poisoned")]
    Poisoned,
}

impl StorageError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub(crate) fn not_found(key: &str) -> Self {
        Self::NotFound {
            key: key.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Synchronous key-value store.
///
/// Implementations guard their own interior state, so a single handle can be
/// shared by every subsystem of a server.
pub trait PersistentStorage: Send + Sync {
    /// Read the value for `key`, or [`StorageError::NotFound`].
    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Create or replace the value for `key`.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Remove `key`. Removing an absent key reports [`StorageError::NotFound`].
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let reason = if key.is_empty() {
        "key must not be empty"
    } else if key.len() > KEY_LENGTH_MAX {
        "key exceeds 32 bytes"
    } else if key.chars().any(char::is_control) {
        "key must not contain control characters"
    } else {
        return Ok(());
    };
    Err(StorageError::InvalidKey {
        key: key.to_string(),
        reason,
    })
}
