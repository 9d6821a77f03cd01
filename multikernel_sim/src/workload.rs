//! Random task sets for a run.
use lib::task::Task;
use log::warn;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;

pub struct WorkloadGenerator {
    burst_range: RangeInclusive<u32>,
    memory_range: RangeInclusive<usize>,
    rng: StdRng,
}

impl WorkloadGenerator {
    /// Returns `None` when either range is empty.
    pub fn new(
        burst_range: RangeInclusive<u32>,
        memory_range: RangeInclusive<usize>,
        seed: Option<u64>,
    ) -> Option<Self> {
        if burst_range.is_empty() || memory_range.is_empty() {
            return None;
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Some(Self {
            burst_range,
            memory_range,
            rng,
        })
    }

    /// Creates tasks `0..number_of_tasks`, each arriving at its creation instant.
    pub fn generate(&mut self, number_of_tasks: usize) -> Vec<Task> {
        (0..number_of_tasks)
            .map(|id| {
                let burst_time = self.rng.gen_range(self.burst_range.clone());
                let memory_required = self.rng.gen_range(self.memory_range.clone());
                Task::arriving_now(id, burst_time, memory_required)
            })
            .collect()
    }

    pub fn get_max_memory_required(&self) -> usize {
        *self.memory_range.end()
    }
}

/// Same tasks with their arrival reset to now, for replaying a workload in a new run.
pub fn restamp_arrivals(tasks: &[Task]) -> Vec<Task> {
    tasks
        .iter()
        .map(|task| Task::arriving_now(task.id(), task.burst_time(), task.memory_required()))
        .collect()
}

pub fn warn_if_unschedulable(max_memory_required: usize, largest_capacity: usize) {
    if max_memory_required > largest_capacity {
        warn!(
            "Tasks may need up to {} memory units but the largest core holds {}; such tasks never complete.",
            max_memory_required, largest_capacity
        );
    }
}
