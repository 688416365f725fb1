use acs_core::{DeviceId, Report};
use acs_engine::{Committed, Engine, Rejected};
use acs_storage::{SqliteStorage, Storage, StorageError};

use crate::doubles::{ManualClock, ScriptedIds};

/// One engine instance with a controllable clock and identity source.
pub struct TestNode<S = SqliteStorage> {
    pub engine: Engine<S>,
    pub clock: ManualClock,
    pub ids: ScriptedIds,
}

impl TestNode<SqliteStorage> {
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self::with_storage(SqliteStorage::open_in_memory()?))
    }
}

impl<S: Storage> TestNode<S> {
    pub fn with_storage(storage: S) -> Self {
        let clock = ManualClock::default();
        let ids = ScriptedIds::default();
        let engine =
            Engine::with_collaborators(storage, Box::new(clock.clone()), Box::new(ids.clone()));
        Self { engine, clock, ids }
    }

    pub fn storage(&self) -> &S {
        self.engine.storage()
    }

    pub fn report(&self, report: &Report) -> Result<Committed, Rejected> {
        self.engine.reconcile(report)
    }

    /// Reconciles `report` and returns the device it landed on.
    pub fn commit(&self, report: &Report) -> Result<DeviceId, Rejected> {
        Ok(self.report(report)?.device_id)
    }
}
