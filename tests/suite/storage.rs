use std::sync::Arc;

use failsafe_core::{MarkerStore, FAIL_SAFE_MARKER_KEY};
use failsafe_storage::{FileStorage, PersistentStorage, SqliteStorage, StorageError};
use failsafe_types::{FabricIndex, Marker};

fn round_trip_across_reopen(open: impl Fn() -> Arc<dyn PersistentStorage>) {
    {
        let markers = MarkerStore::with_storage(open());
        markers.save(&Marker::new(FabricIndex::new(7))).unwrap();
    }
    let markers = MarkerStore::with_storage(open());
    assert_eq!(
        markers.load().unwrap(),
        Some(Marker::new(FabricIndex::new(7)))
    );
    markers.erase();
    assert!(MarkerStore::with_storage(open()).load().unwrap().is_none());
}

#[test]
fn file_backend_persists_marker() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("kv");
    round_trip_across_reopen(|| Arc::new(FileStorage::open(&root).unwrap()));
}

#[test]
fn sqlite_backend_persists_marker() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kv.sqlite");
    round_trip_across_reopen(|| Arc::new(SqliteStorage::open(&path).unwrap()));
}

#[test]
fn marker_record_is_minimal_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
    MarkerStore::with_storage(storage.clone())
        .save(&Marker::new(FabricIndex::new(9)))
        .unwrap();

    assert_eq!(
        storage.get(FAIL_SAFE_MARKER_KEY).unwrap(),
        vec![0x15, 0x24, 0x00, 0x09, 0x18]
    );
}

#[test]
fn backends_reject_invalid_keys() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    assert!(matches!(
        storage.set("", b"x"),
        Err(StorageError::InvalidKey { .. })
    ));
    let long_key = "k".repeat(33);
    assert!(matches!(
        storage.get(&long_key),
        Err(StorageError::InvalidKey { .. })
    ));
}
