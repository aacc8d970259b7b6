//! Crash recovery across restarts on persistent backends.

use std::sync::Arc;
use std::time::Duration;

use failsafe_engine::{BootRecovery, DeviceEvent, FabricIndex, FailSafeState, Marker};
use failsafe_storage::{PersistentStorage, SqliteStorage};

use crate::common::{file_storage, reopen_file_storage, start};

#[test]
fn interrupted_commit_is_rolled_back_on_next_boot() {
    let (dir, storage) = file_storage();
    {
        let (mut server, log) = start(storage);
        server
            .fail_safe_mut()
            .arm_fail_safe(FabricIndex::new(7), Duration::from_secs(60))
            .unwrap();
        server.fail_safe_mut().set_add_noc_command_invoked(true);
        server
            .fail_safe()
            .markers()
            .save(&Marker::new(FabricIndex::new(7)))
            .unwrap();
        // Power is lost before the commit completes.
        assert_eq!(log.len(), 0);
    }

    let (mut server, log) = start(reopen_file_storage(&dir));
    assert_eq!(
        server.boot_recovery().recovered(),
        Some(Marker::new(FabricIndex::new(7)))
    );
    server.run_until_idle();

    assert_eq!(
        log.events(),
        vec![DeviceEvent::FailSafeTimerExpired {
            fabric_index: FabricIndex::new(7),
            add_noc_command_invoked: true,
            update_noc_command_invoked: false,
        }]
    );
    assert_eq!(log.states(), vec![FailSafeState::ExpiringBusy]);
    assert_eq!(server.fail_safe().state(), FailSafeState::Disarmed);
    drop(server);

    // The cleanup handler erased the marker, so the next boot is clean.
    let (mut server, log) = start(reopen_file_storage(&dir));
    assert!(matches!(server.boot_recovery(), BootRecovery::Clean));
    server.run_until_idle();
    assert_eq!(log.len(), 0);
}

#[test]
fn clean_boot_changes_nothing() {
    let (_dir, storage) = file_storage();
    let (mut server, log) = start(storage);

    assert!(matches!(server.boot_recovery(), BootRecovery::Clean));
    assert!(server.run_until_idle().is_empty());
    assert_eq!(log.len(), 0);
    assert_eq!(server.fail_safe().state(), FailSafeState::Disarmed);
    assert!(!server.active_mode().unwrap().is_active());
}

#[test]
fn unreadable_marker_is_left_alone() {
    let (dir, storage) = file_storage();
    storage.set("g/fs/m", &[0x15, 0x24, 0x01, 0x07, 0x18]).unwrap();
    drop(storage);

    let storage = reopen_file_storage(&dir);
    let (mut server, log) = start(Arc::clone(&storage));
    assert!(matches!(
        server.boot_recovery(),
        BootRecovery::Unreadable(_)
    ));
    server.run_until_idle();

    assert_eq!(log.len(), 0);
    assert_eq!(server.fail_safe().state(), FailSafeState::Disarmed);
    assert_eq!(
        storage.get("g/fs/m").unwrap(),
        vec![0x15, 0x24, 0x01, 0x07, 0x18]
    );
}

#[test]
fn sqlite_backend_recovers_marker() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kv.sqlite");
    {
        let storage: Arc<dyn PersistentStorage> = Arc::new(SqliteStorage::open(&path).unwrap());
        let (server, _log) = start(storage);
        server
            .fail_safe()
            .markers()
            .save(&Marker::new(FabricIndex::new(12)))
            .unwrap();
    }

    let storage: Arc<dyn PersistentStorage> = Arc::new(SqliteStorage::open(&path).unwrap());
    let (mut server, log) = start(Arc::clone(&storage));
    server.run_until_idle();

    assert_eq!(
        log.events(),
        vec![DeviceEvent::FailSafeTimerExpired {
            fabric_index: FabricIndex::new(12),
            add_noc_command_invoked: true,
            update_noc_command_invoked: false,
        }]
    );
    assert!(storage.get("g/fs/m").unwrap_err().is_not_found());
}
