#![warn(missing_docs)]
//! # conbench
//!
//! Measures how throughput and per-task latency change when the same batch
//! of work runs under different concurrency strategies:
//! - **Cooperative**: one event-loop thread, admission by semaphore
//! - **Thread pool**: exactly C OS threads
//! - **Process pool**: C worker processes fed over length-prefixed IPC
//! - **Sequential**: the one-at-a-time baseline every speedup is relative to
//!
//! Latency is counted from the moment a task is admitted, so time spent
//! waiting for a slot never shows up in the percentiles.
//!
//! ## Quick Start
//!
//! ```no_run
//! use conbench::prelude::*;
//! use std::time::Duration;
//!
//! let workload = WorkloadSpec::simulated_io(Duration::from_millis(5), Duration::from_millis(20));
//! let config = TaskConfig::new(200, 16, workload, Strategy::Cooperative).unwrap();
//!
//! let measured = BoundedExecutor::new(config.clone()).run().unwrap().stats();
//! let baseline = SequentialRunner::new(config).run().unwrap().stats();
//! println!("p95 {:.2} ms, {:.1}x faster", measured.p95_ms(), speedup(&baseline, &measured));
//! ```
//!
//! ## Custom Work
//!
//! ```no_run
//! use conbench::prelude::*;
//! use std::sync::Arc;
//!
//! let config = TaskConfig::new(64, 8, WorkloadSpec::cpu_bound(0), Strategy::ThreadPool).unwrap();
//! let unit = Arc::new(FnUnit::new(|| Ok(cpu_work(50_000))));
//! let outcome = BoundedExecutor::new(config).run_unit(unit).unwrap();
//! assert_eq!(outcome.timings.len(), 64);
//! ```

// Re-export core types
pub use conbench_core::{
    Admission, ConfigError, FnUnit, LatencyRecorder, RunError, RunOutcome, Strategy, TaskConfig,
    TaskTiming, WorkError, WorkUnit, WorkloadSpec, available_cpus, cpu_work, default_workers,
};

// Re-export executors and reporting
pub use conbench_cli::{
    BoundedExecutor, ConbenchConfig, OutputFormat, RunReport, SequentialRunner, render,
};

// Re-export stats
pub use conbench_stats::{RunStats, aggregate, percentile, speedup, throughput};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BoundedExecutor, FnUnit, RunError, RunStats, SequentialRunner, Strategy, TaskConfig,
        WorkError, WorkUnit, WorkloadSpec, cpu_work, speedup,
    };
}

/// Run the conbench CLI.
///
/// A binary that embeds conbench must call this from `main()` so the
/// process-pool strategy can re-execute it as a worker:
/// ```ignore
/// fn main() -> anyhow::Result<()> {
///     conbench::run()
/// }
/// ```
pub use conbench_cli::run;
