//! A whole machine: `number_of_cores` cores sharing one message bus, one metrics
//! collector and one memory tracker. There is no central scheduler; this type only
//! builds the cores, hands out tasks, and starts and stops the threads.
use log::{info, warn};
use parking_lot::Mutex;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::{
    config::SimulationConfig,
    core::{Core, CoreHandle, SharedContext},
    error::ConfigError,
    memory_manager::MemoryManager,
    memory_tracker::MemoryTracker,
    message_bus::MessageBus,
    metrics_collector::{MetricsCollector, TaskRecord},
    scheduler::{LocalScheduler, SchedulerBase},
    scheduler_creator::create_scheduler,
    task::{Task, TaskId},
};

const COMPLETION_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Read-only copy of every aggregate a run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    pub task_records: Vec<TaskRecord>,
    pub task_turnarounds: Vec<(TaskId, i64)>,
    pub core_utilization_percent: BTreeMap<usize, f64>,
    pub sent_counts: BTreeMap<usize, u64>,
    pub recv_counts: BTreeMap<usize, u64>,
    pub memory_log: BTreeMap<usize, Vec<usize>>,
    pub average_turnaround: f64,
    pub average_waiting: f64,
}

enum CoreSet {
    Built(Vec<Core>),
    Running(Vec<CoreHandle>),
    Stopped,
}

pub struct MultikernelSystem {
    config: SimulationConfig,
    shared: SharedContext,
    cores: CoreSet,
    schedulers: Vec<Arc<Mutex<LocalScheduler>>>,
    memory_managers: Vec<Arc<MemoryManager>>,
    next_core: usize,
}

impl MultikernelSystem {
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let num_cores = config.number_of_cores;
        let shared = SharedContext::new(num_cores);
        let timing = config.get_core_timing();

        let cores: Vec<Core> = (0..num_cores)
            .map(|core_id| {
                Core::new(
                    core_id,
                    num_cores,
                    create_scheduler(config.scheduler),
                    config.get_memory_capacity(core_id),
                    shared.clone(),
                    timing,
                )
            })
            .collect();
        let schedulers = cores.iter().map(Core::get_scheduler).collect();
        let memory_managers = cores.iter().map(Core::get_memory_manager).collect();

        Ok(Self {
            config,
            shared,
            cores: CoreSet::Built(cores),
            schedulers,
            memory_managers,
            next_core: 0,
        })
    }

    pub fn get_config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn get_number_of_cores(&self) -> usize {
        self.schedulers.len()
    }

    /// Hands `task` to the next core in round-robin order and returns that core's id.
    pub fn submit(&mut self, task: Task) -> usize {
        let core_id = self.next_core;
        self.next_core = (self.next_core + 1) % self.get_number_of_cores();
        self.schedulers[core_id].lock().add_task(task);
        core_id
    }

    /// Hands `task` to a specific core. Returns `false` if no such core exists.
    pub fn submit_to(&self, core_id: usize, task: Task) -> bool {
        match self.schedulers.get(core_id) {
            Some(scheduler) => {
                scheduler.lock().add_task(task);
                true
            }
            None => {
                warn!("Cannot submit {} to unknown core {}", task, core_id);
                false
            }
        }
    }

    pub fn start(&mut self) -> io::Result<()> {
        let cores = match std::mem::replace(&mut self.cores, CoreSet::Stopped) {
            CoreSet::Built(cores) => cores,
            other => {
                self.cores = other;
                warn!("The system has already been started");
                return Ok(());
            }
        };

        let mut handles = Vec::with_capacity(cores.len());
        for core in cores {
            match core.start() {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    Self::stop_and_join_handles(handles);
                    return Err(err);
                }
            }
        }
        info!("Started {} cores", handles.len());
        self.cores = CoreSet::Running(handles);
        Ok(())
    }

    /// Stops every core and waits for all of them. Aggregates are final afterwards.
    pub fn stop_and_join(&mut self) {
        match std::mem::replace(&mut self.cores, CoreSet::Stopped) {
            CoreSet::Running(handles) => {
                Self::stop_and_join_handles(handles);
                info!("All cores stopped");
            }
            other => self.cores = other,
        }
    }

    fn stop_and_join_handles(handles: Vec<CoreHandle>) {
        // Signal every core before joining any, so no core waits on a stopped peer.
        for handle in &handles {
            handle.stop();
        }
        for handle in handles {
            let core_id = handle.get_core_id();
            if handle.join().is_err() {
                warn!("Core {} panicked", core_id);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.cores, CoreSet::Running(_))
    }

    /// Polls until `expected` tasks have completed or `timeout` elapses.
    pub fn wait_for_completion(&self, expected: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.shared.metrics_collector.get_completed_task_count() >= expected {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(COMPLETION_POLL_INTERVAL);
        }
    }

    /// Tasks still waiting in some core's queue.
    pub fn get_pending_task_count(&self) -> usize {
        self.schedulers
            .iter()
            .map(|scheduler| scheduler.lock().len())
            .sum()
    }

    pub fn get_memory_used(&self, core_id: usize) -> Option<usize> {
        self.memory_managers
            .get(core_id)
            .map(|memory_manager| memory_manager.get_used_memory())
    }

    pub fn get_memory_managers(&self) -> &[Arc<MemoryManager>] {
        &self.memory_managers
    }

    pub fn get_message_bus(&self) -> &MessageBus {
        &self.shared.message_bus
    }

    pub fn get_metrics_collector(&self) -> &MetricsCollector {
        &self.shared.metrics_collector
    }

    pub fn get_memory_tracker(&self) -> &MemoryTracker {
        &self.shared.memory_tracker
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        let metrics = &self.shared.metrics_collector;
        SimulationSnapshot {
            task_records: metrics.get_task_records(),
            task_turnarounds: metrics.get_task_turnarounds(),
            core_utilization_percent: metrics.get_core_utilization_percent(),
            sent_counts: self.shared.message_bus.get_sent_count_snapshot(),
            recv_counts: self.shared.message_bus.get_recv_count_snapshot(),
            memory_log: self.shared.memory_tracker.get_memory_log(),
            average_turnaround: metrics.get_average_turnaround(),
            average_waiting: metrics.get_average_waiting(),
        }
    }
}

impl Drop for MultikernelSystem {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
