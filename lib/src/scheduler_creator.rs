use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{
    error::ConfigError,
    scheduler::{FifoScheduler, LocalScheduler, ShortestBurstFirstScheduler},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerType {
    #[default]
    Fifo,
    ShortestBurstFirst,
}

impl fmt::Display for SchedulerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerType::Fifo => write!(f, "fifo"),
            SchedulerType::ShortestBurstFirst => write!(f, "shortest_burst_first"),
        }
    }
}

impl FromStr for SchedulerType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fifo" | "round_robin" => Ok(SchedulerType::Fifo),
            "shortest_burst_first" | "sbf" | "sjf" => Ok(SchedulerType::ShortestBurstFirst),
            other => Err(ConfigError::UnknownScheduler(other.to_string())),
        }
    }
}

pub fn create_scheduler(scheduler_type: SchedulerType) -> LocalScheduler {
    match scheduler_type {
        SchedulerType::Fifo => LocalScheduler::Fifo(FifoScheduler::default()),
        SchedulerType::ShortestBurstFirst => {
            LocalScheduler::ShortestBurstFirst(ShortestBurstFirstScheduler::default())
        }
    }
}
