use std::fmt;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};

use crate::secure_fs::{ensure_secure_db_file, ensure_secure_dir};
use crate::{PersistentStorage, StorageError, validate_key};

/// SQLite-backed key-value store.
pub struct SqliteStorage {
    db: Mutex<Connection>,
}

impl fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStorage").finish_non_exhaustive()
    }
}

impl SqliteStorage {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY NOT NULL,
            value BLOB NOT NULL
        );
    ";

    /// Open or create the database at `path` with owner-only permissions.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            ensure_secure_dir(parent)?;
        }
        ensure_secure_db_file(path)?;

        let db = Connection::open(path)?;
        Self::initialize(db)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(db: Connection) -> Result<Self, StorageError> {
        // The marker must be durable before the commit it guards begins.
        db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")?;
        db.execute_batch(Self::SCHEMA)?;
        Ok(Self { db: Mutex::new(db) })
    }
}

impl PersistentStorage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        let db = self.db.lock().map_err(|_| StorageError::Poisoned)?;
        let value: Option<Vec<u8>> = db
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        value.ok_or_else(|| StorageError::not_found(key))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        let db = self.db.lock().map_err(|_| StorageError::Poisoned)?;
        db.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let db = self.db.lock().map_err(|_| StorageError::Poisoned)?;
        let deleted = db.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        if deleted == 0 {
            return Err(StorageError::not_found(key));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteStorage;
    use crate::PersistentStorage;

    #[test]
    fn in_memory_set_get_delete() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.set("g/fs/m", &[0x15, 0x24, 0x00, 0x07, 0x18]).unwrap();
        storage.set("g/fs/m", &[0x15, 0x24, 0x00, 0x08, 0x18]).unwrap();
        assert_eq!(
            storage.get("g/fs/m").unwrap(),
            vec![0x15, 0x24, 0x00, 0x08, 0x18]
        );
        storage.delete("g/fs/m").unwrap();
        assert!(storage.get("g/fs/m").unwrap_err().is_not_found());
        assert!(storage.delete("g/fs/m").unwrap_err().is_not_found());
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("kv.sqlite");
        {
            let storage = SqliteStorage::open(&path).unwrap();
            storage.set("k", b"v").unwrap();
        }
        let storage = SqliteStorage::open(&path).unwrap();
        assert_eq!(storage.get("k").unwrap(), b"v");
    }

    #[cfg(unix)]
    #[test]
    fn database_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.sqlite");
        let _storage = SqliteStorage::open(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
