pub mod devices;
pub mod error;
pub mod parameters;
pub mod reconcile;
pub mod resolver;

pub use devices::DeviceStore;
pub use error::EngineError;
pub use parameters::{ParameterBatch, ParameterFailure, ParameterStore};
pub use reconcile::{Committed, Coordinator, ReconcileStage, RejectReason, Rejected};
pub use resolver::{IdentityResolver, MAX_RESOLVE_ATTEMPTS};

use acs_core::{Clock, IdGenerator, RandomIdGenerator, Report, SystemClock};
use acs_storage::Storage;

/// Owns the injected collaborators and hands out component views over them.
///
/// The engine never opens or closes the store; whoever constructs it does.
pub struct Engine<S> {
    storage: S,
    clock: Box<dyn Clock>,
    ids: Box<dyn IdGenerator>,
}

impl<S: Storage> Engine<S> {
    pub fn new(storage: S) -> Self {
        Self::with_collaborators(
            storage,
            Box::new(SystemClock::new()),
            Box::new(RandomIdGenerator),
        )
    }

    pub fn with_collaborators(
        storage: S,
        clock: Box<dyn Clock>,
        ids: Box<dyn IdGenerator>,
    ) -> Self {
        Self {
            storage,
            clock,
            ids,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn devices(&self) -> DeviceStore<'_, S> {
        DeviceStore::new(&self.storage, self.clock.as_ref())
    }

    pub fn parameters(&self) -> ParameterStore<'_, S> {
        ParameterStore::new(&self.storage, self.clock.as_ref())
    }

    pub fn resolver(&self) -> IdentityResolver<'_, S> {
        IdentityResolver::new(self.devices(), self.ids.as_ref())
    }

    pub fn coordinator(&self) -> Coordinator<'_, S> {
        Coordinator::new(self.resolver(), self.devices(), self.parameters())
    }

    pub fn reconcile(&self, report: &Report) -> Result<Committed, Rejected> {
        self.coordinator().reconcile(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acs_core::{DeviceAttributes, ParameterFlags, ParameterValue, ReportedParameter};
    use acs_storage::SqliteStorage;

    fn engine() -> Engine<SqliteStorage> {
        Engine::new(SqliteStorage::open_in_memory().unwrap())
    }

    #[test]
    fn resolve_is_stable_per_serial() {
        let engine = engine();
        let first = engine.resolver().resolve("SN-1").unwrap();
        let again = engine.resolver().resolve("SN-1").unwrap();
        let other = engine.resolver().resolve("SN-2").unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(engine.devices().count().unwrap(), 2);
    }

    #[test]
    fn resolve_rejects_blank_serial() {
        let engine = engine();
        let err = engine.resolver().resolve("  ").unwrap_err();
        assert!(matches!(err, EngineError::InvalidReport(_)));
        assert_eq!(engine.devices().count().unwrap(), 0);
    }

    #[test]
    fn resolve_with_seeds_only_new_devices() {
        let engine = engine();
        let seed = DeviceAttributes::new("HW1", "1.0", "http://192.0.2.1:7547/");
        let id = engine.resolver().resolve_with("SN-1", &seed).unwrap();
        assert_eq!(engine.devices().get(id).unwrap().attributes, seed);

        let other_seed = DeviceAttributes::new("HW9", "9.9", "");
        engine.resolver().resolve_with("SN-1", &other_seed).unwrap();
        assert_eq!(engine.devices().get(id).unwrap().attributes, seed);
    }

    #[test]
    fn create_refuses_known_serial() {
        let engine = engine();
        let id = engine.resolver().resolve("SN-1").unwrap();
        let err = engine
            .devices()
            .create(RandomIdGenerator.generate(), "SN-1", DeviceAttributes::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateSerial(ref s) if s == "SN-1"));
        assert_eq!(engine.devices().get_by_serial("SN-1").unwrap().device_id, id);
    }

    #[test]
    fn upsert_attributes_needs_existing_device() {
        let engine = engine();
        let err = engine
            .devices()
            .upsert_attributes(RandomIdGenerator.generate(), &DeviceAttributes::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn upsert_many_reports_failure_and_remainder() {
        let engine = engine();
        let ghost = RandomIdGenerator.generate();
        let reported: Vec<ReportedParameter> = ["A", "B", "C"]
            .iter()
            .map(|name| ReportedParameter {
                name: format!("Device.{name}"),
                value: ParameterValue::string("v"),
                flags: ParameterFlags::READABLE,
            })
            .collect();

        let batch = engine.parameters().upsert_many(ghost, &reported);
        assert!(!batch.is_complete());
        assert!(batch.applied.is_empty());
        let failure = batch.failed.unwrap();
        assert_eq!(failure.name, "Device.A");
        assert!(matches!(failure.error, EngineError::OwnerNotFound(_)));
        assert_eq!(batch.not_attempted, vec!["Device.B", "Device.C"]);
    }

    #[test]
    fn load_all_distinguishes_missing_device_from_empty() {
        let engine = engine();
        let id = engine.resolver().resolve("SN-1").unwrap();
        assert!(engine.parameters().load_all(id).unwrap().is_empty());

        let err = engine
            .parameters()
            .load_all(RandomIdGenerator.generate())
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn flag_query_on_unknown_device_is_not_found() {
        let engine = engine();
        let id = engine.resolver().resolve("SN-1").unwrap();
        assert!(engine.parameters().with_flags(id, ParameterFlags::READABLE).unwrap().is_empty());

        let err = engine
            .parameters()
            .with_flags(RandomIdGenerator.generate(), ParameterFlags::READABLE)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn get_missing_parameter_is_not_found() {
        let engine = engine();
        let id = engine.resolver().resolve("SN-1").unwrap();
        let err = engine.parameters().get(id, "Device.Nope").unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
