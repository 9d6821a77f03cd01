//! Bounded per-core memory pool.
use log::warn;
use parking_lot::Mutex;

/// All operations take the same lock, so every caller sees a fully updated
/// `used` value and `0 <= used <= total_capacity` holds at every observable instant.
#[derive(Debug)]
pub struct MemoryManager {
    total_capacity: usize,
    used: Mutex<usize>,
}

impl MemoryManager {
    pub fn new(total_capacity: usize) -> Self {
        Self {
            total_capacity,
            used: Mutex::new(0),
        }
    }

    /// Reserves `amount` units if they fit. Returns `false` without side effects otherwise.
    pub fn allocate(&self, amount: usize) -> bool {
        let mut used = self.used.lock();
        match used.checked_add(amount) {
            Some(new_used) if new_used <= self.total_capacity => {
                *used = new_used;
                true
            }
            _ => false,
        }
    }

    /// Releases `amount` units. Releasing more than is in use clamps to zero.
    pub fn deallocate(&self, amount: usize) {
        let mut used = self.used.lock();
        if amount > *used {
            warn!(
                "Deallocating {} units with only {} in use; clamping to zero",
                amount, *used
            );
            *used = 0;
        } else {
            *used -= amount;
        }
    }

    /// Same admission test as `allocate`, without reserving anything.
    pub fn can_fit(&self, amount: usize) -> bool {
        let used = self.used.lock();
        used.checked_add(amount)
            .is_some_and(|new_used| new_used <= self.total_capacity)
    }

    /// Allocates `amount` units and returns a guard that releases them when dropped.
    pub fn reserve(&self, amount: usize) -> Option<MemoryReservation<'_>> {
        self.allocate(amount).then_some(MemoryReservation {
            memory_manager: self,
            amount,
        })
    }

    pub fn get_used_memory(&self) -> usize {
        *self.used.lock()
    }

    pub fn get_total_capacity(&self) -> usize {
        self.total_capacity
    }
}

/// Memory held for one task execution. Released exactly once, when dropped.
#[derive(Debug)]
pub struct MemoryReservation<'a> {
    memory_manager: &'a MemoryManager,
    amount: usize,
}

impl MemoryReservation<'_> {
    pub fn amount(&self) -> usize {
        self.amount
    }

    pub fn release(self) {}
}

impl Drop for MemoryReservation<'_> {
    fn drop(&mut self) {
        self.memory_manager.deallocate(self.amount);
    }
}
