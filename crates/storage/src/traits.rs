use std::sync::Arc;

use acs_core::{
    Device, DeviceAttributes, DeviceId, Parameter, ParameterFlags, ParameterValue, Timestamp,
};

use crate::error::StorageError;

/// The store of record for devices and their parameters.
///
/// Every write is a single atomic statement. Implementations must enforce
/// serial-number uniqueness and (device, name) uniqueness themselves so that
/// callers on different connections or processes never need a shared lock.
pub trait Storage {
    /// Fails with `DuplicateSerial` or `DuplicateIdentity` on a uniqueness
    /// violation; nothing is written in that case.
    fn insert_device(&self, device: &Device) -> Result<(), StorageError>;

    fn get_device(&self, device_id: DeviceId) -> Result<Option<Device>, StorageError>;

    fn get_device_by_serial(&self, serial_number: &str) -> Result<Option<Device>, StorageError>;

    /// Overwrites the mutable attributes and stamps `updated_at`.
    /// Returns `None` if no device has this identity.
    fn update_device_attributes(
        &self,
        device_id: DeviceId,
        attributes: &DeviceAttributes,
        now: Timestamp,
    ) -> Result<Option<Device>, StorageError>;

    /// Removes the device and all of its parameters.
    fn delete_device(&self, device_id: DeviceId) -> Result<(), StorageError>;

    fn device_count(&self) -> Result<u64, StorageError>;

    /// Insert, or update on (owner, name) conflict, in one statement.
    /// `created_at` is only set on insert.
    fn upsert_parameter(
        &self,
        owner: DeviceId,
        name: &str,
        value: &ParameterValue,
        flags: ParameterFlags,
        now: Timestamp,
    ) -> Result<Parameter, StorageError>;

    fn get_parameter(&self, owner: DeviceId, name: &str)
    -> Result<Option<Parameter>, StorageError>;

    /// All parameters of a device, ordered by name.
    fn get_parameters(&self, owner: DeviceId) -> Result<Vec<Parameter>, StorageError>;

    /// Parameters whose flags contain every flag in `flags`, ordered by name.
    fn get_parameters_with_flags(
        &self,
        owner: DeviceId,
        flags: ParameterFlags,
    ) -> Result<Vec<Parameter>, StorageError>;

    fn parameter_count(&self, owner: DeviceId) -> Result<u64, StorageError>;
}

impl<S: Storage + ?Sized> Storage for Arc<S> {
    fn insert_device(&self, device: &Device) -> Result<(), StorageError> {
        (**self).insert_device(device)
    }

    fn get_device(&self, device_id: DeviceId) -> Result<Option<Device>, StorageError> {
        (**self).get_device(device_id)
    }

    fn get_device_by_serial(&self, serial_number: &str) -> Result<Option<Device>, StorageError> {
        (**self).get_device_by_serial(serial_number)
    }

    fn update_device_attributes(
        &self,
        device_id: DeviceId,
        attributes: &DeviceAttributes,
        now: Timestamp,
    ) -> Result<Option<Device>, StorageError> {
        (**self).update_device_attributes(device_id, attributes, now)
    }

    fn delete_device(&self, device_id: DeviceId) -> Result<(), StorageError> {
        (**self).delete_device(device_id)
    }

    fn device_count(&self) -> Result<u64, StorageError> {
        (**self).device_count()
    }

    fn upsert_parameter(
        &self,
        owner: DeviceId,
        name: &str,
        value: &ParameterValue,
        flags: ParameterFlags,
        now: Timestamp,
    ) -> Result<Parameter, StorageError> {
        (**self).upsert_parameter(owner, name, value, flags, now)
    }

    fn get_parameter(
        &self,
        owner: DeviceId,
        name: &str,
    ) -> Result<Option<Parameter>, StorageError> {
        (**self).get_parameter(owner, name)
    }

    fn get_parameters(&self, owner: DeviceId) -> Result<Vec<Parameter>, StorageError> {
        (**self).get_parameters(owner)
    }

    fn get_parameters_with_flags(
        &self,
        owner: DeviceId,
        flags: ParameterFlags,
    ) -> Result<Vec<Parameter>, StorageError> {
        (**self).get_parameters_with_flags(owner, flags)
    }

    fn parameter_count(&self, owner: DeviceId) -> Result<u64, StorageError> {
        (**self).parameter_count(owner)
    }
}
