use thiserror::Error;

use crate::message::CorrelationId;

/// Failures reported by the message bus. None of them stops a core.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("core {0} is not attached to the message bus")]
    UnknownCore(usize),
    #[error("no reply for request {correlation_id} before the timeout")]
    Timeout { correlation_id: CorrelationId },
    #[error("wait for reply to request {correlation_id} was cancelled")]
    Cancelled { correlation_id: CorrelationId },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("number_of_cores must be at least 1")]
    NoCores,
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("expected {expected} per-core memory capacities, found {found}")]
    CapacityCountMismatch { expected: usize, found: usize },
    #[error("unknown scheduler type: {0}")]
    UnknownScheduler(String),
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}
