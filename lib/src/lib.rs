pub mod config;
pub mod core;
pub mod error;
pub mod memory_manager;
pub mod memory_tracker;
pub mod message;
pub mod message_bus;
pub mod metrics_collector;
pub mod multikernel;
pub mod output_log;
pub mod scheduler;
pub mod scheduler_creator;
pub mod task;
pub mod util;
