//! Sequential Baseline
//!
//! Runs every unit one after another on the calling thread with the same
//! timing as the concurrent strategies, so a speedup is an apples-to-apples
//! ratio of elapsed times.

use super::{Collector, settle};
use conbench_core::{LatencyRecorder, RunError, RunOutcome, TaskConfig, WorkUnit};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;

/// Runs all N units one at a time
#[derive(Debug, Clone)]
pub struct SequentialRunner {
    config: TaskConfig,
}

impl SequentialRunner {
    /// Runner for `config`; its strategy and concurrency cap are ignored
    pub fn new(config: TaskConfig) -> Self {
        Self { config }
    }

    /// Run the configured workload
    pub fn run(&self) -> Result<RunOutcome, RunError> {
        self.run_unit(self.config.workload())
    }

    /// Run `unit` N times, stopping at the first failure
    pub fn run_unit(&self, unit: &dyn WorkUnit) -> Result<RunOutcome, RunError> {
        self.config.validate()?;
        let tasks = self.config.tasks();
        let mut collector = Collector::new(tasks);

        let start = Instant::now();
        for task in 0..tasks {
            let (attempt, timing) =
                LatencyRecorder::record(|| catch_unwind(AssertUnwindSafe(|| unit.run())));
            match settle(task, attempt) {
                Ok(value) => collector.record(value, timing),
                Err(error) => {
                    collector.fail(error);
                    break;
                }
            }
        }

        collector.finish(start.elapsed())
    }
}
