use tracing::{debug, instrument, warn};

use acs_core::{DeviceAttributes, DeviceId, IdGenerator};
use acs_storage::Storage;

use crate::devices::DeviceStore;
use crate::error::EngineError;

pub const MAX_RESOLVE_ATTEMPTS: u32 = 3;

/// Maps a serial number to its one device identity, registering the device
/// on first sight.
///
/// Uniqueness comes from the store's serial-number constraint: a resolver
/// that loses an insert race reads back and returns the winner's identity.
pub struct IdentityResolver<'a, S: ?Sized> {
    devices: DeviceStore<'a, S>,
    ids: &'a dyn IdGenerator,
}

impl<'a, S: Storage + ?Sized> IdentityResolver<'a, S> {
    pub fn new(devices: DeviceStore<'a, S>, ids: &'a dyn IdGenerator) -> Self {
        Self { devices, ids }
    }

    pub fn resolve(&self, serial_number: &str) -> Result<DeviceId, EngineError> {
        self.resolve_with(serial_number, &DeviceAttributes::default())
    }

    /// Like [`resolve`](Self::resolve), but a newly registered device starts
    /// out with `seed` as its attributes. Existing devices are returned as-is.
    #[instrument(skip(self, seed))]
    pub fn resolve_with(
        &self,
        serial_number: &str,
        seed: &DeviceAttributes,
    ) -> Result<DeviceId, EngineError> {
        if serial_number.trim().is_empty() {
            return Err(EngineError::InvalidReport("empty serial number".into()));
        }

        for attempt in 1..=MAX_RESOLVE_ATTEMPTS {
            match self.devices.get_by_serial(serial_number) {
                Ok(device) => return Ok(device.device_id),
                Err(EngineError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }

            let device_id = self.ids.generate();
            match self.devices.create(device_id, serial_number, seed.clone()) {
                Ok(device) => {
                    debug!(%device_id, "registered new device");
                    return Ok(device.device_id);
                }
                Err(e @ EngineError::DuplicateSerial(_)) => {
                    warn!(attempt, error = %e, "lost registration race, reading back the winner");
                }
                Err(e @ EngineError::DuplicateIdentity(_)) => {
                    warn!(attempt, %device_id, error = %e, "generated identity already taken");
                }
                Err(e) => return Err(e),
            }
        }

        Err(EngineError::ResolutionExhausted {
            serial_number: serial_number.to_string(),
            attempts: MAX_RESOLVE_ATTEMPTS,
        })
    }
}
