use std::collections::HashMap;
use std::sync::Mutex;

use crate::{PersistentStorage, StorageError, validate_key};

/// In-memory backend. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PersistentStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(key))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(key))
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStorage;
    use crate::PersistentStorage;

    #[test]
    fn set_get_delete() {
        let storage = MemoryStorage::new();
        assert!(storage.get("a").unwrap_err().is_not_found());

        storage.set("a", b"\x01\x02").unwrap();
        assert_eq!(storage.get("a").unwrap(), vec![1, 2]);
        assert_eq!(storage.len(), 1);

        storage.set("a", b"\x03").unwrap();
        assert_eq!(storage.get("a").unwrap(), vec![3]);

        storage.delete("a").unwrap();
        assert!(storage.is_empty());
        assert!(storage.delete("a").unwrap_err().is_not_found());
    }
}
