use std::time::Duration;

use failsafe_engine::{
    DeviceConfig, FabricIndex, FailSafeState, Server, ServerInitParams, StorageBackend,
};

use crate::common::EventLog;

#[test]
fn config_file_drives_server_setup() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state").join("kv.sqlite");
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            "[fail_safe]\nmax_cumulative_secs = 30\n\n[storage]\nbackend = \"sqlite\"\npath = {:?}\n\n[runtime]\nmax_queue_depth = 16\n",
            db.display().to_string()
        ),
    )
    .unwrap();

    let config = DeviceConfig::load_from(&config_path).unwrap().unwrap();
    assert_eq!(config.storage_backend(), StorageBackend::Sqlite);
    assert_eq!(config.max_queue_depth(), Some(16));

    let storage = config.open_storage().unwrap();
    assert!(db.exists());
    let mut server = Server::init(ServerInitParams::from_config(&config, storage)).unwrap();
    let log = EventLog::default();
    log.attach(&mut server);

    server
        .fail_safe_mut()
        .arm_fail_safe(FabricIndex::new(1), Duration::from_secs(60))
        .unwrap();
    server.advance(Duration::from_secs(30));

    assert_eq!(log.len(), 1);
    assert_eq!(server.fail_safe().state(), FailSafeState::Disarmed);
}
