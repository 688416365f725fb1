use tracing::{debug, warn};

use acs_core::{Clock, DeviceId, Parameter, ParameterFlags, ParameterValue, ReportedParameter};
use acs_storage::Storage;

use crate::error::EngineError;

/// The entry that stopped a batch and why.
#[derive(Debug)]
pub struct ParameterFailure {
    pub name: String,
    pub error: EngineError,
}

/// Result of applying a sequence of parameters in order.
///
/// Entries are applied one at a time and the batch stops at the first
/// unrecoverable failure, so `applied` is always a prefix of the input.
#[derive(Debug, Default)]
pub struct ParameterBatch {
    pub applied: Vec<Parameter>,
    pub failed: Option<ParameterFailure>,
    pub not_attempted: Vec<String>,
}

impl ParameterBatch {
    pub fn is_complete(&self) -> bool {
        self.failed.is_none()
    }

    pub fn applied_names(&self) -> Vec<String> {
        self.applied.iter().map(|p| p.name.clone()).collect()
    }
}

pub struct ParameterStore<'a, S: ?Sized> {
    storage: &'a S,
    clock: &'a dyn Clock,
}

impl<'a, S: Storage + ?Sized> ParameterStore<'a, S> {
    pub fn new(storage: &'a S, clock: &'a dyn Clock) -> Self {
        Self { storage, clock }
    }

    pub fn get(&self, owner: DeviceId, name: &str) -> Result<Parameter, EngineError> {
        self.storage
            .get_parameter(owner, name)?
            .ok_or_else(|| EngineError::NotFound(format!("parameter {name:?} on device {owner}")))
    }

    /// Creates the parameter or overwrites its value and flags, atomically.
    pub fn upsert(
        &self,
        owner: DeviceId,
        name: &str,
        value: &ParameterValue,
        flags: ParameterFlags,
    ) -> Result<Parameter, EngineError> {
        let result = self
            .storage
            .upsert_parameter(owner, name, value, flags, self.clock.now()?)
            .map_err(EngineError::from);

        let parameter = match result {
            Err(EngineError::DuplicateParameterKey { .. }) => {
                // The row appeared under us; the second attempt takes the update path.
                warn!(%owner, name, "parameter key conflict, retrying as update");
                self.storage
                    .upsert_parameter(owner, name, value, flags, self.clock.now()?)?
            }
            other => other?,
        };
        debug!(%owner, name, value_type = %value.value_type, %flags, "upserted parameter");
        Ok(parameter)
    }

    pub fn upsert_many(&self, owner: DeviceId, parameters: &[ReportedParameter]) -> ParameterBatch {
        let mut batch = ParameterBatch::default();
        for (index, reported) in parameters.iter().enumerate() {
            match self.upsert(owner, &reported.name, &reported.value, reported.flags) {
                Ok(parameter) => batch.applied.push(parameter),
                Err(error) => {
                    batch.failed = Some(ParameterFailure {
                        name: reported.name.clone(),
                        error,
                    });
                    batch.not_attempted = parameters[index + 1..]
                        .iter()
                        .map(|p| p.name.clone())
                        .collect();
                    break;
                }
            }
        }
        batch
    }

    /// Every stored parameter of the device, ordered by name.
    pub fn load_all(&self, owner: DeviceId) -> Result<Vec<Parameter>, EngineError> {
        self.ensure_device(owner)?;
        Ok(self.storage.get_parameters(owner)?)
    }

    /// Parameters carrying at least all of `flags`.
    pub fn with_flags(
        &self,
        owner: DeviceId,
        flags: ParameterFlags,
    ) -> Result<Vec<Parameter>, EngineError> {
        self.ensure_device(owner)?;
        Ok(self.storage.get_parameters_with_flags(owner, flags)?)
    }

    pub fn count(&self, owner: DeviceId) -> Result<u64, EngineError> {
        Ok(self.storage.parameter_count(owner)?)
    }

    // An empty list must mean "no parameters", not "no such device".
    fn ensure_device(&self, owner: DeviceId) -> Result<(), EngineError> {
        match self.storage.get_device(owner)? {
            Some(_) => Ok(()),
            None => Err(EngineError::NotFound(format!("device {owner}"))),
        }
    }
}
