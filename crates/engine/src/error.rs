use acs_core::CoreError;
use acs_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate serial number: {0}")]
    DuplicateSerial(String),

    #[error("duplicate device identity: {0}")]
    DuplicateIdentity(String),

    #[error("duplicate parameter {name:?} on device {device_id}")]
    DuplicateParameterKey { device_id: String, name: String },

    #[error("owner device not found: {0}")]
    OwnerNotFound(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("invalid report: {0}")]
    InvalidReport(String),

    #[error("identity for serial {serial_number} not settled after {attempts} attempts")]
    ResolutionExhausted { serial_number: String, attempts: u32 },

    #[error("storage error: {0}")]
    Storage(#[source] StorageError),

    #[error("core error: {0}")]
    Core(#[source] CoreError),
}

impl EngineError {
    /// Infrastructure failures and identity races that outlasted the retry
    /// budget; resending the same report can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_) | Self::ResolutionExhausted { .. }
        )
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(what) => Self::NotFound(what),
            StorageError::DuplicateSerial { serial_number } => Self::DuplicateSerial(serial_number),
            StorageError::DuplicateIdentity { device_id } => Self::DuplicateIdentity(device_id),
            StorageError::DuplicateParameterKey { device_id, name } => {
                Self::DuplicateParameterKey { device_id, name }
            }
            StorageError::OwnerNotFound { device_id } => Self::OwnerNotFound(device_id),
            StorageError::Unavailable(reason) => Self::StorageUnavailable(reason),
            StorageError::Core(core) => Self::from(core),
            other => Self::Storage(other),
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidReport(reason) => Self::InvalidReport(reason),
            other => Self::Core(other),
        }
    }
}
