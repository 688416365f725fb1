use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use acs_core::{
    Device, DeviceAttributes, DeviceId, Parameter, ParameterFlags, ParameterValue, Timestamp,
};
use acs_storage::{Storage, StorageError};

/// Storage decorator that injects `Unavailable` failures on demand.
///
/// Parameter failures are keyed by call number so a test can break one entry
/// in the middle of a batch.
#[derive(Debug)]
pub struct FaultyStorage<S> {
    inner: S,
    upserts: AtomicUsize,
    fail_upsert_at: AtomicUsize,
    duplicate_keys: AtomicUsize,
    fail_attributes: AtomicBool,
    fail_reads: AtomicBool,
}

const NEVER: usize = usize::MAX;

impl<S: Storage> FaultyStorage<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            upserts: AtomicUsize::new(0),
            fail_upsert_at: AtomicUsize::new(NEVER),
            duplicate_keys: AtomicUsize::new(0),
            fail_attributes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fails the `n`th parameter upsert from now on (1-based), once.
    pub fn fail_upsert_at(&self, n: usize) {
        self.upserts.store(0, Ordering::SeqCst);
        self.fail_upsert_at.store(n, Ordering::SeqCst);
    }

    /// The next `times` parameter upserts report a (device, name) key
    /// conflict without writing, as a store without native upsert would
    /// when another writer inserts the row first.
    pub fn fail_upsert_with_duplicate_key(&self, times: usize) {
        self.duplicate_keys.store(times, Ordering::SeqCst);
    }

    pub fn fail_attributes(&self, fail: bool) {
        self.fail_attributes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.fail_upsert_at.store(NEVER, Ordering::SeqCst);
        self.duplicate_keys.store(0, Ordering::SeqCst);
        self.fail_attributes(false);
        self.fail_reads(false);
    }

    fn check_reads(&self) -> Result<(), StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected read failure".into()));
        }
        Ok(())
    }
}

impl<S: Storage> Storage for FaultyStorage<S> {
    fn insert_device(&self, device: &Device) -> Result<(), StorageError> {
        self.inner.insert_device(device)
    }

    fn get_device(&self, device_id: DeviceId) -> Result<Option<Device>, StorageError> {
        self.check_reads()?;
        self.inner.get_device(device_id)
    }

    fn get_device_by_serial(&self, serial_number: &str) -> Result<Option<Device>, StorageError> {
        self.check_reads()?;
        self.inner.get_device_by_serial(serial_number)
    }

    fn update_device_attributes(
        &self,
        device_id: DeviceId,
        attributes: &DeviceAttributes,
        now: Timestamp,
    ) -> Result<Option<Device>, StorageError> {
        if self.fail_attributes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("injected attribute failure".into()));
        }
        self.inner.update_device_attributes(device_id, attributes, now)
    }

    fn delete_device(&self, device_id: DeviceId) -> Result<(), StorageError> {
        self.inner.delete_device(device_id)
    }

    fn device_count(&self) -> Result<u64, StorageError> {
        self.inner.device_count()
    }

    fn upsert_parameter(
        &self,
        owner: DeviceId,
        name: &str,
        value: &ParameterValue,
        flags: ParameterFlags,
        now: Timestamp,
    ) -> Result<Parameter, StorageError> {
        let call = self.upserts.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .fail_upsert_at
            .compare_exchange(call, NEVER, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return Err(StorageError::Unavailable(format!(
                "injected failure on upsert #{call} ({name})"
            )));
        }
        if self
            .duplicate_keys
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StorageError::DuplicateParameterKey {
                device_id: owner.to_string(),
                name: name.to_string(),
            });
        }
        self.inner.upsert_parameter(owner, name, value, flags, now)
    }

    fn get_parameter(
        &self,
        owner: DeviceId,
        name: &str,
    ) -> Result<Option<Parameter>, StorageError> {
        self.check_reads()?;
        self.inner.get_parameter(owner, name)
    }

    fn get_parameters(&self, owner: DeviceId) -> Result<Vec<Parameter>, StorageError> {
        self.check_reads()?;
        self.inner.get_parameters(owner)
    }

    fn get_parameters_with_flags(
        &self,
        owner: DeviceId,
        flags: ParameterFlags,
    ) -> Result<Vec<Parameter>, StorageError> {
        self.check_reads()?;
        self.inner.get_parameters_with_flags(owner, flags)
    }

    fn parameter_count(&self, owner: DeviceId) -> Result<u64, StorageError> {
        self.inner.parameter_count(owner)
    }
}
