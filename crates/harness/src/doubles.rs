use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use acs_core::{Clock, CoreError, DeviceId, IdGenerator, RandomIdGenerator, Timestamp};

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn starting_at(ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(ms)),
        }
    }

    pub fn advance(&self, ms: u64) -> Timestamp {
        Timestamp::from_millis(self.now_ms.fetch_add(ms, Ordering::SeqCst) + ms)
    }

    pub fn current(&self) -> Timestamp {
        Timestamp::from_millis(self.now_ms.load(Ordering::SeqCst))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_at(1_000)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Result<Timestamp, CoreError> {
        Ok(self.current())
    }
}

/// Hands out queued identities first, then random ones. Clones share the queue.
#[derive(Debug, Clone, Default)]
pub struct ScriptedIds {
    queue: Arc<Mutex<VecDeque<DeviceId>>>,
}

impl ScriptedIds {
    pub fn push(&self, id: DeviceId) {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(id);
    }

    pub fn remaining(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl IdGenerator for ScriptedIds {
    fn generate(&self) -> DeviceId {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .unwrap_or_else(|| RandomIdGenerator.generate())
    }
}
