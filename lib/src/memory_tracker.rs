use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Shared log of used-memory samples, one series per core.
#[derive(Debug, Default)]
pub struct MemoryTracker {
    memory_log: Mutex<BTreeMap<usize, Vec<usize>>>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, core_id: usize, used_memory: usize) {
        self.memory_log
            .lock()
            .entry(core_id)
            .or_default()
            .push(used_memory);
    }

    /// Point-in-time copy of every series.
    pub fn get_memory_log(&self) -> BTreeMap<usize, Vec<usize>> {
        self.memory_log.lock().clone()
    }

    pub fn reset(&self) {
        self.memory_log.lock().clear();
    }
}
