use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use failsafe_utils::{
    AtomicWriteOptions, atomic_remove, atomic_write_with_options, recover_bak_file,
};
use tracing::debug;

use crate::secure_fs::ensure_secure_dir;
use crate::{PersistentStorage, StorageError, validate_key};

const VALUE_EXTENSION: &str = "kv";

/// One file per key inside a directory.
///
/// File names are the hex encoding of the key, so keys containing `/` map to
/// flat names. Every write is a temp-file + rename, which makes each key
/// individually crash-atomic.
#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
    write_options: AtomicWriteOptions,
}

impl FileStorage {
    /// Open (creating if needed) a storage directory with full fsync policy.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open_with_options(root, AtomicWriteOptions::default())
    }

    pub fn open_with_options(
        root: impl AsRef<Path>,
        write_options: AtomicWriteOptions,
    ) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        ensure_secure_dir(&root)?;
        let storage = Self {
            root,
            write_options,
        };
        storage.recover_interrupted_writes()?;
        Ok(storage)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len() * 2 + VALUE_EXTENSION.len() + 1);
        for byte in key.bytes() {
            let _ = write!(name, "{byte:02x}");
        }
        name.push('.');
        name.push_str(VALUE_EXTENSION);
        self.root.join(name)
    }

    fn recover_interrupted_writes(&self) -> Result<(), StorageError> {
        let entries = fs::read_dir(&self.root).map_err(|e| StorageError::io(&self.root, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&self.root, e))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "bak") {
                recover_bak_file(&path.with_extension(VALUE_EXTENSION));
            }
        }
        Ok(())
    }
}

impl PersistentStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::not_found(key)),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        let path = self.path_for(key);
        atomic_write_with_options(&path, value, self.write_options)
            .map_err(|e| StorageError::io(&path, e))?;
        debug!(key, len = value.len(), "Stored value");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let path = self.path_for(key);
        let removed =
            atomic_remove(&path, self.write_options).map_err(|e| StorageError::io(&path, e))?;
        if removed {
            debug!(key, "Deleted value");
            Ok(())
        } else {
            Err(StorageError::not_found(key))
        }
    }
}
