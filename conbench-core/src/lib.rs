#![warn(missing_docs)]
//! Conbench Core
//!
//! Building blocks shared by every execution strategy:
//! - [`TaskConfig`]: validated, immutable parameters of one run
//! - [`WorkUnit`]: the pluggable workload body, with two built-in workloads
//! - [`LatencyRecorder`]: admitted-start / completion timestamps per task
//! - [`RunOutcome`]: what an executor hands back, ready for aggregation
//! - [`WorkerMain`]: the loop a process-pool worker runs

mod config;
mod error;
mod measure;
mod worker;
mod workload;

pub use config::{
    Strategy, TaskConfig, available_cpus, default_workers, latency_from_secs,
};
pub use error::{ConfigError, RunError, WorkError, panic_message};
pub use measure::{Admission, LatencyRecorder, RunOutcome, TaskTiming};
pub use worker::{WorkerMain, execute_task};
pub use workload::{FnUnit, WorkUnit, cpu_work, draw_latency};

pub use conbench_ipc::WorkloadSpec;
pub use conbench_stats::RunStats;
