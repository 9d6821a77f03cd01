//! Run configuration, supplied by the caller or loaded from a YAML file.
use serde_derive::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::{
    core::CoreTiming, error::ConfigError, message_bus::WaitPolicy,
    scheduler_creator::SchedulerType,
};

const DEFAULT_NUMBER_OF_CORES: usize = 2;
const DEFAULT_MEMORY_CAPACITY: usize = 1000;
const DEFAULT_TIME_UNIT_MS: u64 = 1;
const DEFAULT_IDLE_DELAY_MS: u64 = 5;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 200;
const DEFAULT_WAIT_SLICE_MS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub number_of_cores: usize,
    /// Capacity of every core unless `memory_capacities` is given.
    pub memory_capacity: usize,
    /// Per-core capacities, indexed by core id.
    pub memory_capacities: Option<Vec<usize>>,
    pub scheduler: SchedulerType,
    /// Wall time of one burst-time unit.
    pub time_unit_ms: u64,
    /// How long a core sleeps when it has nothing to run.
    pub idle_delay_ms: u64,
    /// Upper bound on a blocking resource negotiation.
    pub request_timeout_ms: u64,
    /// How often a blocked negotiation checks for shutdown.
    pub wait_slice_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            number_of_cores: DEFAULT_NUMBER_OF_CORES,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            memory_capacities: None,
            scheduler: SchedulerType::default(),
            time_unit_ms: DEFAULT_TIME_UNIT_MS,
            idle_delay_ms: DEFAULT_IDLE_DELAY_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            wait_slice_ms: DEFAULT_WAIT_SLICE_MS,
        }
    }
}

impl SimulationConfig {
    pub fn from_yaml_file(file_path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(file_path).map_err(|source| ConfigError::Io {
            path: file_path.to_string(),
            source,
        })?;
        let config: SimulationConfig =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: file_path.to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.number_of_cores == 0 {
            return Err(ConfigError::NoCores);
        }
        if self.time_unit_ms == 0 {
            return Err(ConfigError::ZeroDuration("time_unit_ms"));
        }
        if self.wait_slice_ms == 0 {
            return Err(ConfigError::ZeroDuration("wait_slice_ms"));
        }
        if let Some(capacities) = &self.memory_capacities {
            if capacities.len() != self.number_of_cores {
                return Err(ConfigError::CapacityCountMismatch {
                    expected: self.number_of_cores,
                    found: capacities.len(),
                });
            }
        }
        Ok(())
    }

    pub fn get_memory_capacity(&self, core_id: usize) -> usize {
        self.memory_capacities
            .as_ref()
            .and_then(|capacities| capacities.get(core_id).copied())
            .unwrap_or(self.memory_capacity)
    }

    pub fn get_core_timing(&self) -> CoreTiming {
        CoreTiming {
            time_unit: Duration::from_millis(self.time_unit_ms),
            idle_delay: Duration::from_millis(self.idle_delay_ms),
            wait: WaitPolicy {
                timeout: Duration::from_millis(self.request_timeout_ms),
                wait_slice: Duration::from_millis(self.wait_slice_ms),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, remove_file};

    #[test]
    fn test_simulation_config_default_is_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.get_memory_capacity(1), DEFAULT_MEMORY_CAPACITY);
    }

    #[test]
    fn test_simulation_config_validate_no_cores() {
        let config = SimulationConfig {
            number_of_cores: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoCores)));
    }

    #[test]
    fn test_simulation_config_validate_zero_time_unit() {
        let config = SimulationConfig {
            time_unit_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDuration("time_unit_ms"))
        ));
    }

    #[test]
    fn test_simulation_config_validate_capacity_count_mismatch() {
        let config = SimulationConfig {
            number_of_cores: 3,
            memory_capacities: Some(vec![10, 20]),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CapacityCountMismatch {
                expected: 3,
                found: 2
            })
        ));
    }

    #[test]
    fn test_simulation_config_per_core_capacity() {
        let config = SimulationConfig {
            number_of_cores: 2,
            memory_capacities: Some(vec![10, 500]),
            ..Default::default()
        };
        assert_eq!(config.get_memory_capacity(0), 10);
        assert_eq!(config.get_memory_capacity(1), 500);
    }

    #[test]
    fn test_simulation_config_core_timing() {
        let config = SimulationConfig {
            time_unit_ms: 2,
            idle_delay_ms: 3,
            request_timeout_ms: 40,
            wait_slice_ms: 4,
            ..Default::default()
        };
        let timing = config.get_core_timing();
        assert_eq!(timing.time_unit, Duration::from_millis(2));
        assert_eq!(timing.idle_delay, Duration::from_millis(3));
        assert_eq!(timing.wait.timeout, Duration::from_millis(40));
        assert_eq!(timing.wait.wait_slice, Duration::from_millis(4));
    }

    #[test]
    fn test_simulation_config_from_yaml_file_normal() {
        fs::create_dir_all("../outputs").unwrap();
        let file_path = "../outputs/test_simulation_config_from_yaml_file_normal.yaml";
        fs::write(
            file_path,
            "number_of_cores: 4\nmemory_capacity: 300\nscheduler: shortest_burst_first\n",
        )
        .unwrap();

        let config = SimulationConfig::from_yaml_file(file_path).unwrap();
        assert_eq!(config.number_of_cores, 4);
        assert_eq!(config.memory_capacity, 300);
        assert_eq!(config.scheduler, SchedulerType::ShortestBurstFirst);
        assert_eq!(config.idle_delay_ms, DEFAULT_IDLE_DELAY_MS);
        remove_file(file_path).unwrap();
    }

    #[test]
    fn test_simulation_config_from_yaml_file_missing() {
        let result = SimulationConfig::from_yaml_file("../outputs/no_such_config.yaml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_simulation_config_from_yaml_file_invalid() {
        fs::create_dir_all("../outputs").unwrap();
        let file_path = "../outputs/test_simulation_config_from_yaml_file_invalid.yaml";
        fs::write(file_path, "number_of_cores: 0\n").unwrap();

        let result = SimulationConfig::from_yaml_file(file_path);
        assert!(matches!(result, Err(ConfigError::NoCores)));
        remove_file(file_path).unwrap();
    }
}
