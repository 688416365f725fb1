use tracing::debug;

use acs_core::{Clock, Device, DeviceAttributes, DeviceId};
use acs_storage::Storage;

use crate::error::EngineError;

/// Device records keyed by identity. Serial numbers and creation stamps are
/// never touched after insert.
pub struct DeviceStore<'a, S: ?Sized> {
    storage: &'a S,
    clock: &'a dyn Clock,
}

impl<'a, S: Storage + ?Sized> DeviceStore<'a, S> {
    pub fn new(storage: &'a S, clock: &'a dyn Clock) -> Self {
        Self { storage, clock }
    }

    pub fn get(&self, device_id: DeviceId) -> Result<Device, EngineError> {
        self.storage
            .get_device(device_id)?
            .ok_or_else(|| EngineError::NotFound(format!("device {device_id}")))
    }

    pub fn get_by_serial(&self, serial_number: &str) -> Result<Device, EngineError> {
        self.storage
            .get_device_by_serial(serial_number)?
            .ok_or_else(|| EngineError::NotFound(format!("serial number {serial_number}")))
    }

    /// Low-level insert used by the identity resolver. Fails with
    /// `DuplicateSerial` if the serial number is already registered.
    pub fn create(
        &self,
        device_id: DeviceId,
        serial_number: &str,
        attributes: DeviceAttributes,
    ) -> Result<Device, EngineError> {
        let device = Device::new(device_id, serial_number, attributes, self.clock.now()?);
        self.storage.insert_device(&device)?;
        debug!(%device_id, serial_number, "created device record");
        Ok(device)
    }

    /// Last-write-wins overwrite of hardware version, software version and
    /// connection request URL.
    pub fn upsert_attributes(
        &self,
        device_id: DeviceId,
        attributes: &DeviceAttributes,
    ) -> Result<Device, EngineError> {
        let device = self
            .storage
            .update_device_attributes(device_id, attributes, self.clock.now()?)?
            .ok_or_else(|| EngineError::NotFound(format!("device {device_id}")))?;
        debug!(
            %device_id,
            hardware_version = %device.attributes.hardware_version,
            software_version = %device.attributes.software_version,
            "applied device attributes"
        );
        Ok(device)
    }

    /// Removes the device together with all of its parameters.
    pub fn delete(&self, device_id: DeviceId) -> Result<(), EngineError> {
        self.storage.delete_device(device_id)?;
        debug!(%device_id, "deleted device record");
        Ok(())
    }

    pub fn count(&self) -> Result<u64, EngineError> {
        Ok(self.storage.device_count()?)
    }
}
