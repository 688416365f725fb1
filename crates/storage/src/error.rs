use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[source] rusqlite::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate serial number: {serial_number}")]
    DuplicateSerial { serial_number: String },

    #[error("duplicate device identity: {device_id}")]
    DuplicateIdentity { device_id: String },

    #[error("duplicate parameter {name:?} on device {device_id}")]
    DuplicateParameterKey { device_id: String, name: String },

    #[error("owner device not found: {device_id}")]
    OwnerNotFound { device_id: String },

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("core error: {0}")]
    Core(#[from] acs_core::CoreError),
}

impl StorageError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Lock contention past the busy timeout and I/O-level failures mean the
/// store could not be reached; everything else is a real statement error.
impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(
                    err.code,
                    ErrorCode::DatabaseBusy
                        | ErrorCode::DatabaseLocked
                        | ErrorCode::CannotOpen
                        | ErrorCode::SystemIoFailure
                        | ErrorCode::NotADatabase
                        | ErrorCode::DiskFull
                        | ErrorCode::FileLockingProtocolFailed
                        | ErrorCode::PermissionDenied
                ) =>
            {
                StorageError::Unavailable(e.to_string())
            }
            _ => StorageError::Sqlite(e),
        }
    }
}
