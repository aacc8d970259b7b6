use std::time::Duration;

use failsafe_engine::{FabricIndex, FailSafeState};

use crate::common::{file_storage, start};

#[tokio::test(start_paused = true)]
async fn expiry_is_delivered_in_real_time() {
    let (_dir, storage) = file_storage();
    let (mut server, log) = start(storage);
    server
        .fail_safe_mut()
        .arm_fail_safe(FabricIndex::new(2), Duration::from_secs(2))
        .unwrap();

    server
        .run_realtime(|server| server.fail_safe().state() == FailSafeState::Disarmed)
        .await;

    assert_eq!(log.len(), 1);
    assert!(server.time_since_init() >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn disarm_before_deadline_posts_nothing() {
    let (_dir, storage) = file_storage();
    let (mut server, log) = start(storage);
    server
        .fail_safe_mut()
        .arm_fail_safe(FabricIndex::new(2), Duration::from_secs(30))
        .unwrap();

    let run = tokio::time::timeout(
        Duration::from_secs(5),
        server.run_realtime(|server| !server.fail_safe().is_armed()),
    )
    .await;
    assert!(run.is_err());
    server.fail_safe_mut().disarm_fail_safe();
    server.run_realtime(|_| false).await;

    assert_eq!(log.len(), 0);
    assert_eq!(server.fail_safe().state(), FailSafeState::Disarmed);
}
