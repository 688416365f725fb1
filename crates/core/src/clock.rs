use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Milliseconds since Unix epoch.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Returns the current wall-clock time as milliseconds since Unix epoch.
pub fn physical_now() -> Result<u64, CoreError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .map_err(|_| CoreError::Clock("system clock before epoch".into()))
}

/// Source of `created_at` / `updated_at` stamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> Result<Timestamp, CoreError>;
}

/// Wall clock that never repeats or goes backwards for a given instance.
///
/// If the physical clock has not advanced past the last issued stamp (same
/// millisecond, or the system clock stepped back), the stamp is bumped by one
/// millisecond instead.
pub struct SystemClock {
    last_ms: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            last_ms: AtomicU64::new(0),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Result<Timestamp, CoreError> {
        let physical = physical_now()?;
        let mut last = self.last_ms.load(Ordering::Acquire);
        loop {
            let next = if physical > last { physical } else { last + 1 };
            match self
                .last_ms
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(Timestamp(next)),
                Err(observed) => last = observed,
            }
        }
    }
}
