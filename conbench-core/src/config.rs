//! Run Configuration
//!
//! A `TaskConfig` is validated when it is built and cannot be changed
//! afterwards, so executors never see a zero task count, a zero concurrency
//! cap, or inverted latency bounds.

use crate::error::ConfigError;
use conbench_ipc::WorkloadSpec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How tasks are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Single-threaded event loop, concurrency bounded by a semaphore
    Cooperative,
    /// Fixed pool of OS threads
    #[default]
    ThreadPool,
    /// Fixed pool of worker processes
    ProcessPool,
    /// One task at a time on the calling thread
    Sequential,
}

impl Strategy {
    /// All strategies, in report order
    pub const ALL: [Strategy; 4] = [
        Strategy::Cooperative,
        Strategy::ThreadPool,
        Strategy::ProcessPool,
        Strategy::Sequential,
    ];

    /// Stable kebab-case name
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Cooperative => "cooperative",
            Strategy::ThreadPool => "thread-pool",
            Strategy::ProcessPool => "process-pool",
            Strategy::Sequential => "sequential",
        }
    }

    /// Whether the strategy's natural workload is CPU-bound
    pub fn prefers_cpu_work(self) -> bool {
        matches!(self, Strategy::ProcessPool)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cooperative" | "async" => Ok(Strategy::Cooperative),
            "thread-pool" | "threads" | "thread" => Ok(Strategy::ThreadPool),
            "process-pool" | "processes" | "process" => Ok(Strategy::ProcessPool),
            "sequential" | "baseline" => Ok(Strategy::Sequential),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Logical CPUs available to this process (at least 1)
pub fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

/// Default concurrency cap for `strategy` on a machine with `cpus` CPUs.
///
/// Waiting workloads get `min(64, cpus * 4)` slots, worker processes one per
/// CPU, the sequential baseline exactly one.
pub fn default_workers(strategy: Strategy, cpus: usize) -> usize {
    let cpus = cpus.max(1);
    match strategy {
        Strategy::Cooperative | Strategy::ThreadPool => (cpus * 4).min(64),
        Strategy::ProcessPool => cpus,
        Strategy::Sequential => 1,
    }
}

/// Convert a user-supplied latency in seconds into a `Duration`
pub fn latency_from_secs(secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::InvalidLatency {
        value: secs,
        reason: e.to_string(),
    })
}

/// Immutable parameters of one benchmark run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskConfig {
    tasks: usize,
    concurrency: usize,
    workload: WorkloadSpec,
    strategy: Strategy,
}

impl TaskConfig {
    /// Build and validate a configuration
    pub fn new(
        tasks: usize,
        concurrency: usize,
        workload: WorkloadSpec,
        strategy: Strategy,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            tasks,
            concurrency,
            workload,
            strategy,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every invariant, reporting the first violation
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tasks == 0 {
            return Err(ConfigError::NoTasks);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::NoConcurrency);
        }
        if let Some((min, max)) = self.workload.latency_bounds() {
            if min > max {
                return Err(ConfigError::LatencyBounds { min, max });
            }
        }
        Ok(())
    }

    /// Same parameters, different strategy (used for the sequential baseline)
    pub fn with_strategy(&self, strategy: Strategy) -> Self {
        Self {
            strategy,
            ..self.clone()
        }
    }

    /// Number of tasks N
    pub fn tasks(&self) -> usize {
        self.tasks
    }

    /// Configured concurrency cap C
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Number of workers actually started: never more than there are tasks,
    /// and exactly one for the sequential strategy
    pub fn effective_concurrency(&self) -> usize {
        match self.strategy {
            Strategy::Sequential => 1,
            _ => self.concurrency.min(self.tasks),
        }
    }

    /// Workload every task runs
    pub fn workload(&self) -> &WorkloadSpec {
        &self.workload
    }

    /// Scheduling strategy
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io(min_ms: u64, max_ms: u64) -> WorkloadSpec {
        WorkloadSpec::simulated_io(Duration::from_millis(min_ms), Duration::from_millis(max_ms))
    }

    #[test]
    fn test_valid_config() {
        let config = TaskConfig::new(200, 16, io(5, 20), Strategy::ThreadPool).unwrap();
        assert_eq!(config.tasks(), 200);
        assert_eq!(config.concurrency(), 16);
        assert_eq!(config.effective_concurrency(), 16);
        assert_eq!(config.strategy(), Strategy::ThreadPool);
    }

    #[test]
    fn test_rejects_zero_tasks() {
        let err = TaskConfig::new(0, 4, io(1, 2), Strategy::Cooperative).unwrap_err();
        assert!(matches!(err, ConfigError::NoTasks));
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let err = TaskConfig::new(10, 0, io(1, 2), Strategy::Cooperative).unwrap_err();
        assert!(matches!(err, ConfigError::NoConcurrency));
    }

    #[test]
    fn test_rejects_inverted_latency_bounds() {
        let err = TaskConfig::new(10, 2, io(20, 5), Strategy::ThreadPool).unwrap_err();
        assert!(matches!(err, ConfigError::LatencyBounds { .. }));
    }

    #[test]
    fn test_equal_latency_bounds_are_fine() {
        assert!(TaskConfig::new(1, 1, io(5, 5), Strategy::Sequential).is_ok());
    }

    #[test]
    fn test_effective_concurrency_is_capped_by_tasks() {
        let config =
            TaskConfig::new(3, 64, WorkloadSpec::cpu_bound(10), Strategy::ProcessPool).unwrap();
        assert_eq!(config.effective_concurrency(), 3);
        assert_eq!(config.with_strategy(Strategy::Sequential).effective_concurrency(), 1);
    }

    #[test]
    fn test_with_strategy_keeps_everything_else() {
        let config = TaskConfig::new(50, 8, io(1, 3), Strategy::Cooperative).unwrap();
        let baseline = config.with_strategy(Strategy::Sequential);
        assert_eq!(baseline.tasks(), 50);
        assert_eq!(baseline.concurrency(), 8);
        assert_eq!(baseline.workload(), config.workload());
        assert_eq!(config.strategy(), Strategy::Cooperative);
    }

    #[test]
    fn test_strategy_names_round_trip() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.as_str().parse::<Strategy>().unwrap(), strategy);
        }
        assert_eq!("threads".parse::<Strategy>().unwrap(), Strategy::ThreadPool);
        assert!("fibers".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_default_workers() {
        assert_eq!(default_workers(Strategy::ThreadPool, 4), 16);
        assert_eq!(default_workers(Strategy::Cooperative, 32), 64);
        assert_eq!(default_workers(Strategy::ProcessPool, 8), 8);
        assert_eq!(default_workers(Strategy::Sequential, 8), 1);
        assert_eq!(default_workers(Strategy::ProcessPool, 0), 1);
    }

    #[test]
    fn test_latency_from_secs() {
        assert_eq!(latency_from_secs(0.005).unwrap(), Duration::from_millis(5));
        assert!(latency_from_secs(-1.0).is_err());
        assert!(latency_from_secs(f64::NAN).is_err());
    }
}
