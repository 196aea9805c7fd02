//! Bounded Executors
//!
//! Runs N work units with at most C of them admitted at any instant and hands
//! back one [`TaskTiming`] per unit.
//!
//! ## Strategies
//!
//! ```text
//!                      TaskConfig
//!                          │
//!            ┌─────────────┼──────────────┬──────────────┐
//!            ▼             ▼              ▼              ▼
//!      ┌───────────┐ ┌───────────┐ ┌─────────────┐ ┌────────────┐
//!      │cooperative│ │ threaded  │ │   process   │ │ sequential │
//!      │ semaphore │ │rayon pool │ │ worker pool │ │  1 at a    │
//!      │ + JoinSet │ │ C threads │ │ C processes │ │   time     │
//!      └─────┬─────┘ └─────┬─────┘ └──────┬──────┘ └─────┬──────┘
//!            └─────────────┴──────┬───────┴──────────────┘
//!                                 ▼
//!                     RunOutcome { elapsed, timings }
//! ```
//!
//! Every strategy follows the same failure rule: the first failing unit
//! closes admission, units already admitted run to completion, and the run
//! returns [`RunError::Workload`]. Pools, runtimes and worker processes are
//! torn down before `run` returns, whether it succeeded or not.
//!
//! ## Modules
//!
//! - [`cooperative`] - single-threaded tokio runtime, semaphore admission
//! - [`threaded`] - scoped rayon pool of exactly C threads
//! - [`process`] - C worker processes driven over IPC
//! - [`sequential`] - the baseline runner

mod cooperative;
mod process;
mod sequential;
mod threaded;

pub use sequential::SequentialRunner;

use conbench_core::{
    ConfigError, RunError, RunOutcome, Strategy, TaskConfig, TaskTiming, WorkError, WorkUnit,
    panic_message,
};
use std::any::Any;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{info, warn};

/// Runs a [`TaskConfig`] under its strategy's concurrency cap
#[derive(Debug, Clone)]
pub struct BoundedExecutor {
    config: TaskConfig,
    worker_binary: Option<PathBuf>,
}

impl BoundedExecutor {
    /// Executor for `config`
    pub fn new(config: TaskConfig) -> Self {
        Self {
            config,
            worker_binary: None,
        }
    }

    /// Use `binary` for process-pool workers instead of the running
    /// executable
    pub fn with_worker_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.worker_binary = Some(binary.into());
        self
    }

    /// The configuration this executor runs
    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Run the configured workload
    pub fn run(&self) -> Result<RunOutcome, RunError> {
        self.run_unit(Arc::new(*self.config.workload()))
    }

    /// Run `unit` N times under the configured strategy
    pub fn run_unit(&self, unit: Arc<dyn WorkUnit>) -> Result<RunOutcome, RunError> {
        self.config.validate()?;
        let strategy = self.config.strategy();
        info!(
            %strategy,
            tasks = self.config.tasks(),
            concurrency = self.config.effective_concurrency(),
            "starting run"
        );

        let result = match strategy {
            Strategy::Cooperative => cooperative::run(&self.config, unit),
            Strategy::ThreadPool => threaded::run(&self.config, unit),
            Strategy::ProcessPool => {
                let workload = unit
                    .describe()
                    .ok_or(ConfigError::NotPortable(Strategy::ProcessPool.as_str()))?;
                process::run(&self.config, workload, self.worker_binary.as_deref())
            }
            Strategy::Sequential => SequentialRunner::new(self.config.clone()).run_unit(&*unit),
        };

        match &result {
            Ok(outcome) => info!(
                %strategy,
                elapsed_ms = outcome.elapsed.as_secs_f64() * 1_000.0,
                "run finished"
            ),
            Err(e) => warn!(%strategy, error = %e, "run failed"),
        }
        result
    }
}

/// Outcome of one admitted unit as seen by the executor
pub(crate) type Attempt = std::thread::Result<Result<f64, WorkError>>;

/// Turn a unit's result, or the panic that replaced it, into a run error
pub(crate) fn settle(task: usize, attempt: Attempt) -> Result<f64, RunError> {
    match attempt {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(RunError::workload(task as u64, e.message())),
        Err(payload) => Err(panicked(task, payload)),
    }
}

pub(crate) fn panicked(task: usize, payload: Box<dyn Any + Send>) -> RunError {
    RunError::workload(
        task as u64,
        format!("panicked: {}", panic_message(payload.as_ref())),
    )
}

/// Accumulates timings until every unit has reported, keeping only the first
/// failure
#[derive(Debug)]
pub(crate) struct Collector {
    expected: usize,
    timings: Vec<TaskTiming>,
    checksum: f64,
    failure: Option<RunError>,
}

impl Collector {
    pub(crate) fn new(expected: usize) -> Self {
        Self {
            expected,
            timings: Vec::with_capacity(expected),
            checksum: 0.0,
            failure: None,
        }
    }

    pub(crate) fn record(&mut self, value: f64, timing: TaskTiming) {
        self.timings.push(timing);
        self.checksum += value;
    }

    pub(crate) fn fail(&mut self, error: RunError) {
        match self.failure {
            None => self.failure = Some(error),
            Some(_) => warn!(%error, "additional failure while draining"),
        }
    }

    pub(crate) fn has_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Statistics are only ever produced from a complete set of timings.
    pub(crate) fn finish(self, elapsed: Duration) -> Result<RunOutcome, RunError> {
        if let Some(error) = self.failure {
            return Err(error);
        }
        if self.timings.len() != self.expected {
            return Err(RunError::Incomplete {
                expected: self.expected,
                got: self.timings.len(),
            });
        }
        Ok(RunOutcome {
            elapsed,
            timings: self.timings,
            checksum: self.checksum,
        })
    }
}

/// Lock shared by pool threads; a poisoned lock still holds valid data
/// because every critical section is a single push or assignment.
pub(crate) fn lock(collector: &Mutex<Collector>) -> MutexGuard<'_, Collector> {
    collector.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conbench_core::WorkloadSpec;
    use std::time::Instant;

    fn timing() -> TaskTiming {
        let now = Instant::now();
        TaskTiming::new(now, now + Duration::from_millis(1))
    }

    #[test]
    fn test_collector_complete() {
        let mut collector = Collector::new(2);
        collector.record(1.5, timing());
        collector.record(2.5, timing());

        let outcome = collector.finish(Duration::from_millis(2)).unwrap();
        assert_eq!(outcome.timings.len(), 2);
        assert_eq!(outcome.checksum, 4.0);
    }

    #[test]
    fn test_collector_rejects_partial_results() {
        let mut collector = Collector::new(3);
        collector.record(0.0, timing());

        let err = collector.finish(Duration::ZERO).unwrap_err();
        assert!(matches!(err, RunError::Incomplete { expected: 3, got: 1 }));
    }

    #[test]
    fn test_collector_keeps_first_failure() {
        let mut collector = Collector::new(3);
        collector.record(0.0, timing());
        collector.fail(RunError::workload(1, "first"));
        collector.fail(RunError::workload(2, "second"));
        assert!(collector.has_failed());

        match collector.finish(Duration::ZERO).unwrap_err() {
            RunError::Workload { task, message } => {
                assert_eq!(task, 1);
                assert_eq!(message, "first");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_settle_maps_errors_and_panics() {
        assert_eq!(settle(0, Ok(Ok(2.0))).unwrap(), 2.0);

        let err = settle(4, Ok(Err(WorkError::new("bad input")))).unwrap_err();
        assert_eq!(err.to_string(), "task 4 failed: bad input");

        let payload: Box<dyn Any + Send> = Box::new("kaboom");
        let err = settle(5, Err(payload)).unwrap_err();
        assert_eq!(err.to_string(), "task 5 failed: panicked: kaboom");
    }

    #[test]
    fn test_process_pool_rejects_opaque_units() {
        let config = TaskConfig::new(
            2,
            2,
            WorkloadSpec::cpu_bound(10),
            Strategy::ProcessPool,
        )
        .unwrap();
        let unit = Arc::new(conbench_core::FnUnit::new(|| Ok(1.0)));

        let err = BoundedExecutor::new(config).run_unit(unit).unwrap_err();
        assert!(matches!(
            err,
            RunError::Config(ConfigError::NotPortable("process-pool"))
        ));
    }

    #[test]
    fn test_run_dispatches_every_in_process_strategy() {
        for strategy in [
            Strategy::Cooperative,
            Strategy::ThreadPool,
            Strategy::Sequential,
        ] {
            let config = TaskConfig::new(6, 3, WorkloadSpec::cpu_bound(100), strategy).unwrap();
            let outcome = BoundedExecutor::new(config).run().unwrap();
            assert_eq!(outcome.timings.len(), 6, "{strategy}");
            assert!((outcome.checksum - 6.0 * conbench_core::cpu_work(100)).abs() < 1e-6);
        }
    }
}
