mod outputs_result;
mod workload;

use clap::Parser;
use lib::config::SimulationConfig;
use lib::multikernel::{MultikernelSystem, SimulationSnapshot};
use lib::output_log::*;
use lib::scheduler_creator::SchedulerType;
use lib::task::Task;
use log::{error, info, warn};
use outputs_result::{dump_comparison_result_to_file, dump_simulation_result_to_file};
use std::error::Error;
use std::process;
use std::time::Duration;
use workload::{restamp_arrivals, warn_if_unschedulable, WorkloadGenerator};

#[derive(Parser)]
#[clap(
    name = "Multikernel_Simulator",
    version = "1.0",
    about = "About:
    Simulates a multikernel machine: every core runs its own thread with a local ready queue
    and a bounded memory pool. A core that cannot admit a task asks its ring successor to take
    it over the message bus. Values given on the command line override the config file."
)]
struct ArgParser {
    ///Path to a YAML simulation config.
    #[clap(short = 'f', long = "config")]
    config: Option<String>,
    ///Number of processing cores.
    #[clap(short = 'c', long = "number_of_cores")]
    number_of_cores: Option<usize>,
    ///Memory capacity of every core.
    #[clap(short = 'm', long = "memory_capacity")]
    memory_capacity: Option<usize>,
    ///Scheduler policy: fifo or shortest_burst_first.
    #[clap(short = 's', long = "scheduler")]
    scheduler: Option<SchedulerType>,
    ///Wall-clock milliseconds per burst-time unit.
    #[clap(short = 'u', long = "time_unit_ms")]
    time_unit_ms: Option<u64>,
    ///Number of tasks to generate.
    #[clap(short = 'n', long = "number_of_tasks", default_value = "50")]
    number_of_tasks: usize,
    #[clap(long = "burst_min", default_value = "200")]
    burst_min: u32,
    #[clap(long = "burst_max", default_value = "999")]
    burst_max: u32,
    #[clap(long = "memory_min", default_value = "50")]
    memory_min: usize,
    #[clap(long = "memory_max", default_value = "199")]
    memory_max: usize,
    ///Seed for the workload generator.
    #[clap(long = "seed")]
    seed: Option<u64>,
    ///Longest time to wait for all tasks to complete, in milliseconds.
    #[clap(short = 't', long = "run_timeout_ms", default_value = "60000")]
    run_timeout_ms: u64,
    ///Also run the workload under every scheduler and compare average turnaround.
    #[clap(long = "compare")]
    compare: bool,
    ///Path to output directory.
    #[clap(short = 'o', long = "output_dir_path", default_value = "../outputs")]
    output_dir_path: String,
}

fn build_config(arg: &ArgParser) -> Result<SimulationConfig, Box<dyn Error>> {
    let mut config = match &arg.config {
        Some(file_path) => SimulationConfig::from_yaml_file(file_path)?,
        None => SimulationConfig::default(),
    };
    if let Some(number_of_cores) = arg.number_of_cores {
        config.number_of_cores = number_of_cores;
        if config
            .memory_capacities
            .as_ref()
            .is_some_and(|capacities| capacities.len() != number_of_cores)
        {
            warn!("Per-core capacities do not match --number_of_cores; using memory_capacity for every core");
            config.memory_capacities = None;
        }
    }
    if let Some(memory_capacity) = arg.memory_capacity {
        config.memory_capacity = memory_capacity;
        config.memory_capacities = None;
    }
    if let Some(scheduler) = arg.scheduler {
        config.scheduler = scheduler;
    }
    if let Some(time_unit_ms) = arg.time_unit_ms {
        config.time_unit_ms = time_unit_ms;
    }
    config.validate()?;
    Ok(config)
}

/// Runs `tasks` to completion (or until `run_timeout`) and returns the final aggregates.
fn run_simulation(
    config: &SimulationConfig,
    tasks: Vec<Task>,
    run_timeout: Duration,
) -> Result<SimulationSnapshot, Box<dyn Error>> {
    let number_of_tasks = tasks.len();
    let mut system = MultikernelSystem::new(config.clone())?;
    system.start()?;
    for task in tasks {
        system.submit(task);
    }

    if !system.wait_for_completion(number_of_tasks, run_timeout) {
        warn!(
            "Only {} of {} tasks completed within {:?}",
            system.get_metrics_collector().get_completed_task_count(),
            number_of_tasks,
            run_timeout
        );
    }
    system.stop_and_join();
    Ok(system.snapshot())
}

fn compare_schedulers(
    config: &SimulationConfig,
    tasks: &[Task],
    run_timeout: Duration,
) -> Result<Vec<(String, f64)>, Box<dyn Error>> {
    let mut averages = Vec::new();
    for scheduler in [SchedulerType::Fifo, SchedulerType::ShortestBurstFirst] {
        let config = SimulationConfig {
            scheduler,
            ..config.clone()
        };
        let snapshot = run_simulation(&config, restamp_arrivals(tasks), run_timeout)?;
        info!(
            "{}: average turnaround {:.2} ms",
            scheduler, snapshot.average_turnaround
        );
        averages.push((scheduler.to_string(), snapshot.average_turnaround));
    }
    Ok(averages)
}

fn run(arg: &ArgParser) -> Result<(), Box<dyn Error>> {
    let config = build_config(arg)?;
    let mut generator = WorkloadGenerator::new(
        arg.burst_min..=arg.burst_max,
        arg.memory_min..=arg.memory_max,
        arg.seed,
    )
    .ok_or("burst and memory ranges must not be empty")?;
    let largest_capacity = (0..config.number_of_cores)
        .map(|core_id| config.get_memory_capacity(core_id))
        .max()
        .unwrap_or(0);
    warn_if_unschedulable(generator.get_max_memory_required(), largest_capacity);

    let tasks = generator.generate(arg.number_of_tasks);
    let run_timeout = Duration::from_millis(arg.run_timeout_ms);
    info!(
        "Starting multikernel simulation: {} cores, {} tasks, {} scheduler",
        config.number_of_cores,
        tasks.len(),
        config.scheduler
    );

    let snapshot = run_simulation(&config, tasks.clone(), run_timeout)?;
    info!(
        "Simulation complete: {} tasks, average turnaround {:.2} ms, average waiting {:.2} ms",
        snapshot.task_records.len(),
        snapshot.average_turnaround,
        snapshot.average_waiting
    );

    let file_path =
        create_scheduler_log_yaml_file(&arg.output_dir_path, &config.scheduler.to_string());
    dump_simulation_result_to_file(&file_path, tasks.len(), snapshot.task_records.len());
    dump_run_info_to_yaml(&file_path, &config, tasks.len());
    dump_snapshot_to_yaml(&file_path, &snapshot);
    info!("Wrote results to {}", file_path);

    if arg.compare {
        let averages = compare_schedulers(&config, &tasks, run_timeout)?;
        let file_path = create_scheduler_log_yaml_file(&arg.output_dir_path, "comparison");
        dump_comparison_result_to_file(&file_path, &averages);
        info!("Wrote scheduler comparison to {}", file_path);
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let arg = ArgParser::parse();
    if let Err(err) = run(&arg) {
        error!("{}", err);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ArgParser {
        ArgParser::parse_from(std::iter::once("multikernel_sim").chain(args.iter().copied()))
    }

    #[test]
    fn test_build_config_from_arguments() {
        let arg = parse(&["-c", "4", "-m", "300", "-s", "shortest_burst_first"]);
        let config = build_config(&arg).unwrap();
        assert_eq!(config.number_of_cores, 4);
        assert_eq!(config.get_memory_capacity(3), 300);
        assert_eq!(config.scheduler, SchedulerType::ShortestBurstFirst);
    }

    #[test]
    fn test_build_config_rejects_zero_cores() {
        let arg = parse(&["-c", "0"]);
        assert!(build_config(&arg).is_err());
    }

    #[test]
    fn test_run_simulation_completes_every_task() {
        let config = SimulationConfig {
            number_of_cores: 2,
            memory_capacity: 100,
            idle_delay_ms: 1,
            ..Default::default()
        };
        let tasks = WorkloadGenerator::new(1..=5, 10..=90, Some(3))
            .unwrap()
            .generate(10);

        let snapshot = run_simulation(&config, tasks, Duration::from_secs(30)).unwrap();

        assert_eq!(snapshot.task_records.len(), 10);
        assert_eq!(snapshot.core_utilization_percent.len(), 2);
    }

    #[test]
    fn test_compare_schedulers_reports_both_policies() {
        let config = SimulationConfig {
            number_of_cores: 1,
            memory_capacity: 100,
            idle_delay_ms: 1,
            ..Default::default()
        };
        let tasks = WorkloadGenerator::new(1..=5, 10..=50, Some(11))
            .unwrap()
            .generate(5);

        let averages = compare_schedulers(&config, &tasks, Duration::from_secs(30)).unwrap();

        let labels: Vec<&str> = averages.iter().map(|(label, _)| label.as_str()).collect();
        assert_eq!(labels, vec!["fifo", "shortest_burst_first"]);
        assert!(averages.iter().all(|(_, average)| *average >= 0.0));
    }
}
