use serde::{Deserialize, Serialize};

use crate::device::DeviceAttributes;
use crate::parameter::{ParameterFlags, ParameterValue};
use crate::CoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedParameter {
    pub name: String,
    pub value: ParameterValue,
    #[serde(default)]
    pub flags: ParameterFlags,
}

/// One inbound batch of device state, already decoded by the protocol layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub serial_number: String,
    #[serde(flatten)]
    pub attributes: DeviceAttributes,
    #[serde(default)]
    pub parameters: Vec<ReportedParameter>,
}

impl Report {
    pub fn new(serial_number: impl Into<String>, attributes: DeviceAttributes) -> Self {
        Self {
            serial_number: serial_number.into(),
            attributes,
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        value: ParameterValue,
        flags: ParameterFlags,
    ) -> Self {
        self.parameters.push(ReportedParameter {
            name: name.into(),
            value,
            flags,
        });
        self
    }

    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.serial_number.trim().is_empty() {
            return Err(CoreError::InvalidReport("empty serial number".into()));
        }
        if let Some(index) = self.parameters.iter().position(|p| p.name.trim().is_empty()) {
            return Err(CoreError::InvalidReport(format!(
                "parameter #{index} has an empty name"
            )));
        }
        Ok(())
    }
}
