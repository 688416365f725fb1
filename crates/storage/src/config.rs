use std::time::Duration;

use config::{Config, Environment};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// How long a statement waits on a locked database before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_database_path() -> String {
    "acs.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StorageConfig {
    /// Reads `ACS_DATABASE_PATH` and `ACS_BUSY_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, StorageError> {
        let config = Config::builder()
            .add_source(Environment::with_prefix("ACS"))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests touching the process environment must not interleave.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_without_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        unsafe {
            std::env::remove_var("ACS_DATABASE_PATH");
            std::env::remove_var("ACS_BUSY_TIMEOUT_MS");
        }

        let config = StorageConfig::from_env().unwrap();
        assert_eq!(config, StorageConfig::default());
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var("ACS_DATABASE_PATH", "/var/lib/acs/cpe.db");
            std::env::set_var("ACS_BUSY_TIMEOUT_MS", "250");
        }

        let config = StorageConfig::from_env().unwrap();
        assert_eq!(config.database_path, "/var/lib/acs/cpe.db");
        assert_eq!(config.busy_timeout(), Duration::from_millis(250));

        unsafe {
            std::env::remove_var("ACS_DATABASE_PATH");
            std::env::remove_var("ACS_BUSY_TIMEOUT_MS");
        }
    }

    #[test]
    fn malformed_env_is_a_config_error() {
        let _lock = ENV_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var("ACS_BUSY_TIMEOUT_MS", "soon");
        }

        let err = StorageConfig::from_env().unwrap_err();
        assert!(matches!(err, StorageError::Config(_)), "{err}");

        unsafe {
            std::env::remove_var("ACS_BUSY_TIMEOUT_MS");
        }
    }
}
