//! YAML result logs for a finished run.
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;

use crate::{
    config::SimulationConfig,
    metrics_collector::TaskRecord,
    multikernel::SimulationSnapshot,
    scheduler_creator::SchedulerType,
};

#[derive(Serialize, Deserialize)]
struct RunInfo {
    number_of_cores: usize,
    scheduler: SchedulerType,
    memory_capacities: Vec<usize>,
    number_of_tasks: usize,
}

#[derive(Serialize, Deserialize)]
struct TaskLogs {
    task_logs: Vec<TaskRecord>,
}

#[derive(Serialize, Deserialize)]
struct ProcessorLog {
    average_turnaround: f64,
    average_waiting: f64,
    average_utilization: f64,
    core_logs: Vec<CoreLog>,
}

#[derive(Serialize, Deserialize)]
struct CoreLog {
    core_id: usize,
    utilization: f64,
    sent_messages: u64,
    received_messages: u64,
}

#[derive(Serialize, Deserialize)]
struct MemoryLog {
    memory_log: BTreeMap<usize, Vec<usize>>,
}

pub fn create_yaml_file(folder_path: &str, file_name: &str) -> String {
    if fs::metadata(folder_path).is_err() {
        let _ = fs::create_dir_all(folder_path);
        info!("Created folder: {}", folder_path);
    }
    let file_path = format!("{}/{}.yaml", folder_path, file_name);
    if let Err(err) = fs::File::create(&file_path) {
        warn!("Failed to create file: {}", err);
    }
    file_path
}

/// Creates `<dir_path>/<timestamp>-<label>-log.yaml` and returns its path.
pub fn create_scheduler_log_yaml_file(dir_path: &str, label: &str) -> String {
    let now: DateTime<Utc> = Utc::now();
    let date = now.format("%Y-%m-%d-%H-%M-%S").to_string();
    let file_name = format!("{}-{}-log", date, label);
    create_yaml_file(dir_path, &file_name)
}

pub fn append_info_to_yaml(file_path: &str, info: &str) {
    match OpenOptions::new().append(true).create(true).open(file_path) {
        Ok(mut file) => {
            if let Err(err) = file.write_all(info.as_bytes()) {
                warn!("Failed to write to file {}: {}", file_path, err);
            }
        }
        Err(err) => warn!("Failed to open file {}: {}", file_path, err),
    }
}

fn append_serialized_to_yaml(file_path: &str, value: &impl Serialize) {
    match serde_yaml::to_string(value) {
        Ok(yaml) => append_info_to_yaml(file_path, &yaml),
        Err(err) => warn!("Failed to serialize log section: {}", err),
    }
}

pub fn dump_run_info_to_yaml(file_path: &str, config: &SimulationConfig, number_of_tasks: usize) {
    let run_info = RunInfo {
        number_of_cores: config.number_of_cores,
        scheduler: config.scheduler,
        memory_capacities: (0..config.number_of_cores)
            .map(|core_id| config.get_memory_capacity(core_id))
            .collect(),
        number_of_tasks,
    };
    append_serialized_to_yaml(file_path, &run_info);
}

pub fn dump_task_logs_to_yaml(file_path: &str, snapshot: &SimulationSnapshot) {
    let task_logs = TaskLogs {
        task_logs: snapshot.task_records.clone(),
    };
    append_serialized_to_yaml(file_path, &task_logs);
}

pub fn dump_processor_log_to_yaml(file_path: &str, snapshot: &SimulationSnapshot) {
    let core_logs: Vec<CoreLog> = snapshot
        .core_utilization_percent
        .iter()
        .map(|(core_id, utilization)| CoreLog {
            core_id: *core_id,
            utilization: *utilization,
            sent_messages: snapshot.sent_counts.get(core_id).copied().unwrap_or(0),
            received_messages: snapshot.recv_counts.get(core_id).copied().unwrap_or(0),
        })
        .collect();
    let average_utilization = if core_logs.is_empty() {
        0.0
    } else {
        let total: f64 = core_logs.iter().map(|core_log| core_log.utilization).sum();
        total / core_logs.len() as f64
    };
    let processor_log = ProcessorLog {
        average_turnaround: snapshot.average_turnaround,
        average_waiting: snapshot.average_waiting,
        average_utilization,
        core_logs,
    };
    append_serialized_to_yaml(file_path, &processor_log);
}

pub fn dump_memory_log_to_yaml(file_path: &str, snapshot: &SimulationSnapshot) {
    let memory_log = MemoryLog {
        memory_log: snapshot.memory_log.clone(),
    };
    append_serialized_to_yaml(file_path, &memory_log);
}

pub fn dump_snapshot_to_yaml(file_path: &str, snapshot: &SimulationSnapshot) {
    dump_task_logs_to_yaml(file_path, snapshot);
    dump_processor_log_to_yaml(file_path, snapshot);
    dump_memory_log_to_yaml(file_path, snapshot);
}
