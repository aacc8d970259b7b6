//! Shared test utilities and fixtures

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use failsafe_engine::{
    DeviceEvent, FailSafeContext, FailSafeState, MarkerCleanup, PersistentStorage, Server,
    ServerInitParams,
};
use failsafe_storage::FileStorage;
use tempfile::TempDir;

/// Events seen by a handler, with the guard state at delivery time.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<(DeviceEvent, FailSafeState)>>>);

impl EventLog {
    pub fn events(&self) -> Vec<DeviceEvent> {
        self.0.borrow().iter().map(|(event, _)| *event).collect()
    }

    pub fn states(&self) -> Vec<FailSafeState> {
        self.0.borrow().iter().map(|(_, state)| *state).collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Register a recording handler on `server`.
    pub fn attach(&self, server: &mut Server) {
        let log = self.clone();
        server.add_event_handler(move |event: &DeviceEvent, fail_safe: &mut FailSafeContext| {
            log.0.borrow_mut().push((*event, fail_safe.state()));
        });
    }
}

/// File-backed storage in a fresh temporary directory.
pub fn file_storage() -> (TempDir, Arc<dyn PersistentStorage>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = FileStorage::open(dir.path().join("kv")).expect("open file storage");
    (dir, Arc::new(storage))
}

pub fn reopen_file_storage(dir: &TempDir) -> Arc<dyn PersistentStorage> {
    Arc::new(FileStorage::open(dir.path().join("kv")).expect("reopen file storage"))
}

/// A server on `storage` with a recording handler and marker cleanup.
pub fn start(storage: Arc<dyn PersistentStorage>) -> (Server, EventLog) {
    let mut server = Server::init(ServerInitParams {
        storage: Some(storage),
        ..ServerInitParams::default()
    })
    .expect("server init");
    let log = EventLog::default();
    log.attach(&mut server);
    server.add_event_handler(MarkerCleanup);
    (server, log)
}
