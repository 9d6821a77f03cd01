use lib::output_log::append_info_to_yaml;
use log::warn;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize)]
struct ResultInfo {
    submitted_tasks: usize,
    completed_tasks: usize,
    result: bool,
}

#[derive(Serialize, Deserialize)]
struct ComparisonInfo {
    average_turnaround_by_scheduler: BTreeMap<String, f64>,
}

pub fn dump_simulation_result_to_file(
    file_path: &str,
    submitted_tasks: usize,
    completed_tasks: usize,
) {
    let result_info = ResultInfo {
        submitted_tasks,
        completed_tasks,
        result: submitted_tasks == completed_tasks,
    };
    match serde_yaml::to_string(&result_info) {
        Ok(yaml) => append_info_to_yaml(file_path, &yaml),
        Err(err) => warn!("Failed to serialize simulation result to YAML: {}", err),
    }
}

pub fn dump_comparison_result_to_file(file_path: &str, averages: &[(String, f64)]) {
    let comparison_info = ComparisonInfo {
        average_turnaround_by_scheduler: averages.iter().cloned().collect(),
    };
    match serde_yaml::to_string(&comparison_info) {
        Ok(yaml) => append_info_to_yaml(file_path, &yaml),
        Err(err) => warn!("Failed to serialize comparison result to YAML: {}", err),
    }
}
