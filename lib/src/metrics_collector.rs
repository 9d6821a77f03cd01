//! Shared, append-only record of what the cores did.
//!
//! Aggregates read while cores are still running may miss in-flight appends;
//! read them after every core has been stopped and joined.
use getset::CopyGetters;
use parking_lot::Mutex;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::task::{Task, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters, Serialize, Deserialize)]
#[getset(get_copy = "pub")]
pub struct TaskRecord {
    core_id: usize,
    task_id: TaskId,
    arrival_time: i64,
    start_time: i64,
    end_time: i64,
}

impl TaskRecord {
    pub fn turnaround(&self) -> i64 {
        self.end_time - self.arrival_time
    }

    pub fn waiting(&self) -> i64 {
        self.start_time - self.arrival_time
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, CopyGetters, Serialize, Deserialize)]
#[getset(get_copy = "pub")]
pub struct CoreUtilization {
    busy_ms: u64,
    wall_ms: u64,
}

impl CoreUtilization {
    pub fn percent(&self) -> f64 {
        if self.wall_ms == 0 {
            return 0.0;
        }
        (100.0 * self.busy_ms as f64 / self.wall_ms as f64).min(100.0)
    }
}

#[derive(Debug, Default)]
struct MetricsLog {
    task_records: Vec<TaskRecord>,
    core_utilization: BTreeMap<usize, CoreUtilization>,
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    log: Mutex<MetricsLog>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by a core once it has finished running `task`.
    pub fn record_task_completion(
        &self,
        core_id: usize,
        task: &Task,
        start_time: i64,
        end_time: i64,
    ) {
        self.log.lock().task_records.push(TaskRecord {
            core_id,
            task_id: task.id(),
            arrival_time: task.arrival_time(),
            start_time,
            end_time,
        });
    }

    /// Called by a core when its loop exits. Repeated reports for one core accumulate.
    pub fn record_core_utilization(&self, core_id: usize, busy_ms: u64, wall_ms: u64) {
        let mut log = self.log.lock();
        let utilization = log.core_utilization.entry(core_id).or_default();
        utilization.busy_ms += busy_ms;
        utilization.wall_ms += wall_ms;
    }

    pub fn get_core_utilization_percent(&self) -> BTreeMap<usize, f64> {
        self.log
            .lock()
            .core_utilization
            .iter()
            .map(|(core_id, utilization)| (*core_id, utilization.percent()))
            .collect()
    }

    pub fn get_core_utilization(&self) -> BTreeMap<usize, CoreUtilization> {
        self.log.lock().core_utilization.clone()
    }

    /// `(task_id, turnaround_ms)` in completion order.
    pub fn get_task_turnarounds(&self) -> Vec<(TaskId, i64)> {
        self.log
            .lock()
            .task_records
            .iter()
            .map(|record| (record.task_id, record.turnaround()))
            .collect()
    }

    pub fn get_task_records(&self) -> Vec<TaskRecord> {
        self.log.lock().task_records.clone()
    }

    pub fn get_completed_task_count(&self) -> usize {
        self.log.lock().task_records.len()
    }

    pub fn get_average_turnaround(&self) -> f64 {
        let log = self.log.lock();
        average(log.task_records.iter().map(TaskRecord::turnaround))
    }

    pub fn get_average_waiting(&self) -> f64 {
        let log = self.log.lock();
        average(log.task_records.iter().map(TaskRecord::waiting))
    }

    pub fn reset(&self) {
        let mut log = self.log.lock();
        log.task_records.clear();
        log.core_utilization.clear();
    }
}

fn average(values: impl ExactSizeIterator<Item = i64>) -> f64 {
    let count = values.len();
    if count == 0 {
        return 0.0;
    }
    values.sum::<i64>() as f64 / count as f64
}
