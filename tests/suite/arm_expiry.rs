//! Arming, re-arming and expiry through the server's event loop.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use failsafe_core::ActiveNotifier;
use failsafe_engine::{
    DeviceEvent, FabricIndex, FailSafeConfig, FailSafeError, FailSafeState, Marker, Server,
    ServerInitParams,
};
use failsafe_storage::MemoryStorage;
use failsafe_types::KeepActiveReason;

use crate::common::{EventLog, file_storage, start};

#[test]
fn successful_commit_disarms_without_rollback() {
    let (_dir, storage) = file_storage();
    let (mut server, log) = start(Arc::clone(&storage));

    server
        .fail_safe_mut()
        .arm_fail_safe(FabricIndex::new(5), Duration::from_secs(60))
        .unwrap();
    let markers = server.fail_safe().markers();
    markers.save(&Marker::new(FabricIndex::new(5))).unwrap();
    markers.erase();
    server.fail_safe_mut().disarm_fail_safe();

    assert!(server.advance(Duration::from_secs(1_000)).is_empty());
    assert_eq!(log.len(), 0);
    assert_eq!(server.event_loop().with(|l| l.pending_timers()), 0);
    assert!(storage.get("g/fs/m").unwrap_err().is_not_found());
}

#[test]
fn cumulative_timer_bounds_repeated_rearms() {
    let mut server = Server::init(ServerInitParams {
        storage: Some(Arc::new(MemoryStorage::new())),
        fail_safe: FailSafeConfig {
            max_cumulative: Duration::from_secs(100),
        },
        ..ServerInitParams::default()
    })
    .unwrap();
    let log = EventLog::default();
    log.attach(&mut server);

    server
        .fail_safe_mut()
        .arm_fail_safe(FabricIndex::new(9), Duration::from_secs(60))
        .unwrap();
    server.advance(Duration::from_secs(50));
    server
        .fail_safe_mut()
        .arm_fail_safe(FabricIndex::new(9), Duration::from_secs(60))
        .unwrap();
    assert_eq!(log.len(), 0);

    // The attempt timer would run until t=110; the session ends at t=100.
    server.advance(Duration::from_secs(50));
    assert_eq!(log.len(), 1);
    assert_eq!(server.fail_safe().state(), FailSafeState::Disarmed);

    server.advance(Duration::from_secs(100));
    assert_eq!(log.len(), 1);
}

#[test]
fn arming_during_cleanup_is_refused() {
    let (_dir, storage) = file_storage();
    let (mut server, log) = start(storage);
    server
        .fail_safe_mut()
        .arm_fail_safe(FabricIndex::new(3), Duration::from_secs(60))
        .unwrap();
    server.fail_safe_mut().force_fail_safe_timer_expiry();

    assert!(matches!(
        server
            .fail_safe_mut()
            .arm_fail_safe(FabricIndex::new(3), Duration::from_secs(60)),
        Err(FailSafeError::IncorrectState(_))
    ));

    server.run_until_idle();
    assert_eq!(log.len(), 1);
    server
        .fail_safe_mut()
        .arm_fail_safe(FabricIndex::new(3), Duration::from_secs(60))
        .unwrap();
    assert!(server.fail_safe().is_armed_for(FabricIndex::new(3)));
}

#[test]
fn invocation_flags_travel_with_the_event() {
    let (_dir, storage) = file_storage();
    let (mut server, log) = start(storage);
    server
        .fail_safe_mut()
        .arm_fail_safe(FabricIndex::new(4), Duration::from_secs(10))
        .unwrap();
    server.fail_safe_mut().set_update_noc_command_invoked(true);

    server.advance(Duration::from_secs(10));
    assert_eq!(
        log.events(),
        vec![DeviceEvent::FailSafeTimerExpired {
            fabric_index: FabricIndex::new(4),
            add_noc_command_invoked: false,
            update_noc_command_invoked: true,
        }]
    );
    assert!(!server.fail_safe().update_noc_command_invoked());
}

#[derive(Clone, Default)]
struct RecordingNotifier(Rc<RefCell<Vec<bool>>>);

impl ActiveNotifier for RecordingNotifier {
    fn notify_active_required(&mut self, reason: KeepActiveReason, active: bool) {
        assert_eq!(reason, KeepActiveReason::FailSafeArmed);
        self.0.borrow_mut().push(active);
    }
}

#[test]
fn custom_notifier_replaces_tracker() {
    let notifier = RecordingNotifier::default();
    let mut server = Server::init(ServerInitParams {
        storage: Some(Arc::new(MemoryStorage::new())),
        active_notifier: Some(Box::new(notifier.clone())),
        ..ServerInitParams::default()
    })
    .unwrap();
    assert!(server.active_mode().is_none());

    for _ in 0..2 {
        server
            .fail_safe_mut()
            .arm_fail_safe(FabricIndex::new(1), Duration::from_secs(5))
            .unwrap();
        server.advance(Duration::from_secs(5));
    }

    assert_eq!(*notifier.0.borrow(), vec![true, false, true, false]);
}
