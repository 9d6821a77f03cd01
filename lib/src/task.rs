//! The unit of work handed between cores.
use getset::CopyGetters;
use serde_derive::{Deserialize, Serialize};
use std::fmt;

use crate::util::now_millis;

pub type TaskId = usize;

/// A task is immutable once created. Ownership moves from the workload generator
/// to exactly one scheduler queue, possibly to a peer core's queue through
/// negotiation, and finally to the core that executes it.
#[derive(Debug, Clone, PartialEq, Eq, CopyGetters, Serialize, Deserialize)]
#[getset(get_copy = "pub")]
pub struct Task {
    id: TaskId,
    /// Simulated execution cost in time units.
    burst_time: u32,
    /// Memory units held for the whole execution.
    memory_required: usize,
    /// Creation timestamp in milliseconds (see `util::now_millis`).
    arrival_time: i64,
}

impl Task {
    pub fn new(id: TaskId, burst_time: u32, memory_required: usize, arrival_time: i64) -> Self {
        Self {
            id,
            burst_time,
            memory_required,
            arrival_time,
        }
    }

    /// Creates a task whose arrival time is the current instant.
    pub fn arriving_now(id: TaskId, burst_time: u32, memory_required: usize) -> Self {
        Self::new(id, burst_time, memory_required, now_millis())
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Task{{id={}, burst={}, mem={}}}",
            self.id, self.burst_time, self.memory_required
        )
    }
}
