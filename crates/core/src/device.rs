use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::ids::DeviceId;

/// The mutable, last-write-wins attributes of a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAttributes {
    #[serde(default)]
    pub hardware_version: String,
    #[serde(default)]
    pub software_version: String,
    #[serde(default)]
    pub connection_request_url: String,
}

impl DeviceAttributes {
    pub fn new(
        hardware_version: impl Into<String>,
        software_version: impl Into<String>,
        connection_request_url: impl Into<String>,
    ) -> Self {
        Self {
            hardware_version: hardware_version.into(),
            software_version: software_version.into(),
            connection_request_url: connection_request_url.into(),
        }
    }
}

/// One physical CPE. `device_id`, `serial_number` and `created_at` never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: DeviceId,
    pub serial_number: String,
    #[serde(flatten)]
    pub attributes: DeviceAttributes,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Device {
    /// A device record that has not been stored yet.
    pub fn new(
        device_id: DeviceId,
        serial_number: impl Into<String>,
        attributes: DeviceAttributes,
        now: Timestamp,
    ) -> Self {
        Self {
            device_id,
            serial_number: serial_number.into(),
            attributes,
            created_at: now,
            updated_at: now,
        }
    }
}
