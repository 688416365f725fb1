use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, OptionalExtension, ffi};
use tracing::debug;

use acs_core::{
    Device, DeviceAttributes, DeviceId, Parameter, ParameterFlags, ParameterValue, Timestamp,
    ValueType,
};

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::traits::Storage;

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

fn to_timestamp(ms: i64, label: &str) -> Result<Timestamp, StorageError> {
    u64::try_from(ms)
        .map(Timestamp::from_millis)
        .map_err(|_| StorageError::Serialization(format!("negative {label}: {ms}")))
}

fn to_column(ts: Timestamp) -> i64 {
    ts.as_millis() as i64
}

/// Which schema constraint a failed statement ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Constraint {
    SerialNumber,
    DeviceIdentity,
    ParameterKey,
    ForeignKey,
}

fn violated_constraint(e: &rusqlite::Error) -> Option<Constraint> {
    let rusqlite::Error::SqliteFailure(err, msg) = e else {
        return None;
    };
    if err.code != ErrorCode::ConstraintViolation {
        return None;
    }
    if err.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
        return Some(Constraint::ForeignKey);
    }
    let msg = msg.as_deref().unwrap_or_default();
    if msg.contains("devices.serial_number") {
        Some(Constraint::SerialNumber)
    } else if msg.contains("devices.device_id") {
        Some(Constraint::DeviceIdentity)
    } else if msg.contains("parameters.device_id") && msg.contains("parameters.name") {
        Some(Constraint::ParameterKey)
    } else {
        None
    }
}

/// SQLite-backed store. One connection per handle, guarded by a mutex so the
/// handle can be shared across threads. Open several handles on the same file
/// to get real parallelism; the schema keeps them consistent.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open_with_timeout(path, StorageConfig::default().busy_timeout())
    }

    pub fn open_with_config(config: &StorageConfig) -> Result<Self, StorageError> {
        Self::open_with_timeout(&config.database_path, config.busy_timeout())
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        crate::schema::init_schema(&conn)?;
        debug!(path = %path.display(), ?busy_timeout, "opened sqlite storage");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("connection lock poisoned".into()))
    }
}

const DEVICE_COLUMNS: &str = "device_id, serial_number, hardware_version, software_version, connection_request_url, created_at, updated_at";

struct DeviceRow {
    device_id: Vec<u8>,
    serial_number: String,
    hardware_version: String,
    software_version: String,
    connection_request_url: String,
    created_at: i64,
    updated_at: i64,
}

impl DeviceRow {
    fn read(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            device_id: row.get(0)?,
            serial_number: row.get(1)?,
            hardware_version: row.get(2)?,
            software_version: row.get(3)?,
            connection_request_url: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_device(self) -> Result<Device, StorageError> {
        Ok(Device {
            device_id: DeviceId::from_bytes(to_array::<16>(self.device_id, "device_id")?),
            serial_number: self.serial_number,
            attributes: DeviceAttributes {
                hardware_version: self.hardware_version,
                software_version: self.software_version,
                connection_request_url: self.connection_request_url,
            },
            created_at: to_timestamp(self.created_at, "created_at")?,
            updated_at: to_timestamp(self.updated_at, "updated_at")?,
        })
    }
}

const PARAMETER_COLUMNS: &str = "device_id, name, value, value_type, flags, created_at, updated_at";

struct ParameterRow {
    device_id: Vec<u8>,
    name: String,
    value: String,
    value_type: String,
    flags: i64,
    created_at: i64,
    updated_at: i64,
}

impl ParameterRow {
    fn read(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            device_id: row.get(0)?,
            name: row.get(1)?,
            value: row.get(2)?,
            value_type: row.get(3)?,
            flags: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_parameter(self) -> Result<Parameter, StorageError> {
        Ok(Parameter {
            owner: DeviceId::from_bytes(to_array::<16>(self.device_id, "device_id")?),
            name: self.name,
            value: ParameterValue::new(self.value, ValueType::parse(&self.value_type)?),
            flags: ParameterFlags::from_stored(self.flags)?,
            created_at: to_timestamp(self.created_at, "created_at")?,
            updated_at: to_timestamp(self.updated_at, "updated_at")?,
        })
    }
}

fn collect_parameters(
    rows: impl Iterator<Item = rusqlite::Result<ParameterRow>>,
) -> Result<Vec<Parameter>, StorageError> {
    let mut result = Vec::new();
    for row in rows {
        result.push(row?.into_parameter()?);
    }
    Ok(result)
}

impl Storage for SqliteStorage {
    fn insert_device(&self, device: &Device) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO devices (device_id, serial_number, hardware_version, software_version, connection_request_url, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                device.device_id.as_bytes().as_slice(),
                device.serial_number,
                device.attributes.hardware_version,
                device.attributes.software_version,
                device.attributes.connection_request_url,
                to_column(device.created_at),
                to_column(device.updated_at),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(match violated_constraint(&e) {
                Some(Constraint::SerialNumber) => StorageError::DuplicateSerial {
                    serial_number: device.serial_number.clone(),
                },
                Some(Constraint::DeviceIdentity) => StorageError::DuplicateIdentity {
                    device_id: device.device_id.to_string(),
                },
                _ => StorageError::from(e),
            }),
        }
    }

    fn get_device(&self, device_id: DeviceId) -> Result<Option<Device>, StorageError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE device_id = ?1"),
                rusqlite::params![device_id.as_bytes().as_slice()],
                DeviceRow::read,
            )
            .optional()?;
        row.map(DeviceRow::into_device).transpose()
    }

    fn get_device_by_serial(&self, serial_number: &str) -> Result<Option<Device>, StorageError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE serial_number = ?1"),
                rusqlite::params![serial_number],
                DeviceRow::read,
            )
            .optional()?;
        row.map(DeviceRow::into_device).transpose()
    }

    fn update_device_attributes(
        &self,
        device_id: DeviceId,
        attributes: &DeviceAttributes,
        now: Timestamp,
    ) -> Result<Option<Device>, StorageError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "UPDATE devices SET hardware_version = ?1, software_version = ?2, connection_request_url = ?3, updated_at = ?4
                     WHERE device_id = ?5
                     RETURNING {DEVICE_COLUMNS}"
                ),
                rusqlite::params![
                    attributes.hardware_version,
                    attributes.software_version,
                    attributes.connection_request_url,
                    to_column(now),
                    device_id.as_bytes().as_slice(),
                ],
                DeviceRow::read,
            )
            .optional()?;
        row.map(DeviceRow::into_device).transpose()
    }

    fn delete_device(&self, device_id: DeviceId) -> Result<(), StorageError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM devices WHERE device_id = ?1",
            rusqlite::params![device_id.as_bytes().as_slice()],
        )?;
        if deleted == 0 {
            return Err(StorageError::NotFound(device_id.to_string()));
        }
        Ok(())
    }

    fn device_count(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM devices", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn upsert_parameter(
        &self,
        owner: DeviceId,
        name: &str,
        value: &ParameterValue,
        flags: ParameterFlags,
        now: Timestamp,
    ) -> Result<Parameter, StorageError> {
        let conn = self.conn()?;
        let result = conn.query_row(
            &format!(
                "INSERT INTO parameters (device_id, name, value, value_type, flags, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(device_id, name) DO UPDATE SET value = excluded.value, value_type = excluded.value_type, flags = excluded.flags, updated_at = excluded.updated_at
                 RETURNING {PARAMETER_COLUMNS}"
            ),
            rusqlite::params![
                owner.as_bytes().as_slice(),
                name,
                value.raw,
                value.value_type.as_str(),
                flags.to_stored(),
                to_column(now),
            ],
            ParameterRow::read,
        );
        match result {
            Ok(row) => row.into_parameter(),
            Err(e) => Err(match violated_constraint(&e) {
                Some(Constraint::ForeignKey) => StorageError::OwnerNotFound {
                    device_id: owner.to_string(),
                },
                Some(Constraint::ParameterKey) => StorageError::DuplicateParameterKey {
                    device_id: owner.to_string(),
                    name: name.to_string(),
                },
                _ => StorageError::from(e),
            }),
        }
    }

    fn get_parameter(
        &self,
        owner: DeviceId,
        name: &str,
    ) -> Result<Option<Parameter>, StorageError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {PARAMETER_COLUMNS} FROM parameters WHERE device_id = ?1 AND name = ?2"),
                rusqlite::params![owner.as_bytes().as_slice(), name],
                ParameterRow::read,
            )
            .optional()?;
        row.map(ParameterRow::into_parameter).transpose()
    }

    fn get_parameters(&self, owner: DeviceId) -> Result<Vec<Parameter>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PARAMETER_COLUMNS} FROM parameters WHERE device_id = ?1 ORDER BY name"
        ))?;
        let rows = stmt.query_map(
            rusqlite::params![owner.as_bytes().as_slice()],
            ParameterRow::read,
        )?;
        collect_parameters(rows)
    }

    fn get_parameters_with_flags(
        &self,
        owner: DeviceId,
        flags: ParameterFlags,
    ) -> Result<Vec<Parameter>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PARAMETER_COLUMNS} FROM parameters WHERE device_id = ?1 AND (flags & ?2) = ?2 ORDER BY name"
        ))?;
        let rows = stmt.query_map(
            rusqlite::params![owner.as_bytes().as_slice(), flags.to_stored()],
            ParameterRow::read,
        )?;
        collect_parameters(rows)
    }

    fn parameter_count(&self, owner: DeviceId) -> Result<u64, StorageError> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM parameters WHERE device_id = ?1",
            rusqlite::params![owner.as_bytes().as_slice()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acs_core::Clock;
    use acs_core::{IdGenerator, RandomIdGenerator, SystemClock};

    fn new_device(serial: &str) -> Device {
        Device::new(
            RandomIdGenerator.generate(),
            serial,
            DeviceAttributes::new("HW1", "1.0", "http://192.0.2.1:7547/"),
            Timestamp::from_millis(1_000),
        )
    }

    #[test]
    fn insert_and_lookup_both_keys() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let device = new_device("SN-1");
        storage.insert_device(&device).unwrap();

        assert_eq!(storage.get_device(device.device_id).unwrap(), Some(device.clone()));
        assert_eq!(storage.get_device_by_serial("SN-1").unwrap(), Some(device));
        assert_eq!(storage.get_device_by_serial("SN-2").unwrap(), None);
        assert_eq!(storage.device_count().unwrap(), 1);
    }

    #[test]
    fn duplicate_serial_is_classified() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.insert_device(&new_device("SN-1")).unwrap();

        let err = storage.insert_device(&new_device("SN-1")).unwrap_err();
        match err {
            StorageError::DuplicateSerial { serial_number } => assert_eq!(serial_number, "SN-1"),
            other => panic!("expected DuplicateSerial, got {other:?}"),
        }
        assert_eq!(storage.device_count().unwrap(), 1);
    }

    #[test]
    fn duplicate_identity_is_classified() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let first = new_device("SN-1");
        storage.insert_device(&first).unwrap();

        let mut clash = new_device("SN-2");
        clash.device_id = first.device_id;
        let err = storage.insert_device(&clash).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateIdentity { .. }), "got {err:?}");
    }

    #[test]
    fn attribute_update_keeps_immutable_columns() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let device = new_device("SN-1");
        storage.insert_device(&device).unwrap();

        let attributes = DeviceAttributes::new("HW2", "2.0", "http://192.0.2.9:7547/");
        let updated = storage
            .update_device_attributes(device.device_id, &attributes, Timestamp::from_millis(2_000))
            .unwrap()
            .unwrap();
        assert_eq!(updated.attributes, attributes);
        assert_eq!(updated.serial_number, "SN-1");
        assert_eq!(updated.created_at, Timestamp::from_millis(1_000));
        assert_eq!(updated.updated_at, Timestamp::from_millis(2_000));
    }

    #[test]
    fn attribute_update_of_unknown_device_returns_none() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let result = storage
            .update_device_attributes(
                RandomIdGenerator.generate(),
                &DeviceAttributes::default(),
                Timestamp::from_millis(1),
            )
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn serial_number_cannot_be_rewritten() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        storage.insert_device(&new_device("SN-1")).unwrap();

        let conn = storage.conn().unwrap();
        let err = conn
            .execute("UPDATE devices SET serial_number = 'SN-X'", [])
            .unwrap_err();
        assert!(err.to_string().contains("immutable"), "got {err}");
    }

    #[test]
    fn upsert_creates_then_overwrites() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let device = new_device("SN-1");
        storage.insert_device(&device).unwrap();

        let created = storage
            .upsert_parameter(
                device.device_id,
                "Device.WiFi.SSID",
                &ParameterValue::string("home"),
                ParameterFlags::READABLE,
                Timestamp::from_millis(10),
            )
            .unwrap();
        assert_eq!(created.created_at, Timestamp::from_millis(10));
        assert_eq!(created.updated_at, Timestamp::from_millis(10));

        let updated = storage
            .upsert_parameter(
                device.device_id,
                "Device.WiFi.SSID",
                &ParameterValue::string("office"),
                ParameterFlags::READABLE | ParameterFlags::WRITABLE,
                Timestamp::from_millis(20),
            )
            .unwrap();
        assert_eq!(updated.value.raw, "office");
        assert_eq!(updated.flags, ParameterFlags::READABLE | ParameterFlags::WRITABLE);
        assert_eq!(updated.created_at, Timestamp::from_millis(10));
        assert_eq!(updated.updated_at, Timestamp::from_millis(20));

        assert_eq!(storage.parameter_count(device.device_id).unwrap(), 1);
        assert_eq!(
            storage.get_parameter(device.device_id, "Device.WiFi.SSID").unwrap(),
            Some(updated)
        );
    }

    #[test]
    fn upsert_for_missing_owner_is_classified() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let ghost = RandomIdGenerator.generate();
        let err = storage
            .upsert_parameter(
                ghost,
                "Device.WiFi.SSID",
                &ParameterValue::string("x"),
                ParameterFlags::empty(),
                Timestamp::from_millis(1),
            )
            .unwrap_err();
        match err {
            StorageError::OwnerNotFound { device_id } => assert_eq!(device_id, ghost.to_string()),
            other => panic!("expected OwnerNotFound, got {other:?}"),
        }
    }

    #[test]
    fn flag_query_requires_all_bits() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let clock = SystemClock::new();
        let device = new_device("SN-1");
        storage.insert_device(&device).unwrap();

        let rw = ParameterFlags::READABLE | ParameterFlags::WRITABLE;
        for (name, flags) in [
            ("Device.A", ParameterFlags::READABLE),
            ("Device.B", rw),
            ("Device.C", rw | ParameterFlags::ACTIVE_NOTIFY),
            ("Device.D", ParameterFlags::empty()),
        ] {
            storage
                .upsert_parameter(device.device_id, name, &ParameterValue::string("v"), flags, clock.now().unwrap())
                .unwrap();
        }

        let writable: Vec<String> = storage
            .get_parameters_with_flags(device.device_id, rw)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(writable, vec!["Device.B", "Device.C"]);

        let all = storage
            .get_parameters_with_flags(device.device_id, ParameterFlags::empty())
            .unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn delete_cascades_to_parameters() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let device = new_device("SN-1");
        storage.insert_device(&device).unwrap();
        storage
            .upsert_parameter(
                device.device_id,
                "Device.WiFi.SSID",
                &ParameterValue::string("home"),
                ParameterFlags::empty(),
                Timestamp::from_millis(5),
            )
            .unwrap();

        storage.delete_device(device.device_id).unwrap();
        assert_eq!(storage.get_device(device.device_id).unwrap(), None);
        assert_eq!(storage.parameter_count(device.device_id).unwrap(), 0);

        let err = storage.delete_device(device.device_id).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn lock_held_past_busy_timeout_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acs.db");
        let config = StorageConfig {
            database_path: path.to_string_lossy().into_owned(),
            busy_timeout_ms: 50,
        };
        let storage = SqliteStorage::open_with_config(&config).unwrap();

        let blocker = Connection::open(&path).unwrap();
        blocker.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let err = storage.insert_device(&new_device("SN-LOCK")).unwrap_err();
        assert!(err.is_unavailable(), "got {err:?}");

        blocker.execute_batch("ROLLBACK").unwrap();
        storage.insert_device(&new_device("SN-LOCK")).unwrap();
    }
}
