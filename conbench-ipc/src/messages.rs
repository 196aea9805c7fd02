//! IPC Message Types
//!
//! Everything here derives rkyv's `Archive` with `check_bytes` so frames can be
//! validated on receipt. `WorkloadSpec` additionally derives serde because it
//! also appears in configuration files and JSON reports.

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Description of the synthetic work a single task performs.
///
/// This is the only piece of the run configuration a worker process needs, so
/// it is plain data that can be sent with every `Run` command.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Archive,
    RkyvSerialize,
    RkyvDeserialize,
    Serialize,
    Deserialize,
)]
#[archive(check_bytes)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WorkloadSpec {
    /// Blocking (or, under the cooperative strategy, suspending) wait for a
    /// latency drawn uniformly from `[min_latency_ns, max_latency_ns]`
    SimulatedIo {
        /// Lower latency bound in nanoseconds
        min_latency_ns: u64,
        /// Upper latency bound in nanoseconds
        max_latency_ns: u64,
    },
    /// Numeric loop summing `sqrt(i)` for `i` in `1..=iterations`
    CpuBound {
        /// Loop length
        iterations: u64,
    },
}

impl WorkloadSpec {
    /// Simulated I/O between `min` and `max`
    pub fn simulated_io(min: Duration, max: Duration) -> Self {
        Self::SimulatedIo {
            min_latency_ns: saturating_nanos(min),
            max_latency_ns: saturating_nanos(max),
        }
    }

    /// CPU-bound loop of `iterations` steps
    pub fn cpu_bound(iterations: u64) -> Self {
        Self::CpuBound { iterations }
    }

    /// Latency bounds of a simulated I/O workload
    pub fn latency_bounds(&self) -> Option<(Duration, Duration)> {
        match *self {
            Self::SimulatedIo {
                min_latency_ns,
                max_latency_ns,
            } => Some((
                Duration::from_nanos(min_latency_ns),
                Duration::from_nanos(max_latency_ns),
            )),
            Self::CpuBound { .. } => None,
        }
    }

    /// Short name used in logs and reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::SimulatedIo { .. } => "io",
            Self::CpuBound { .. } => "cpu",
        }
    }
}

fn saturating_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Worker identity sent once, right after the worker starts
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct WorkerInfo {
    /// Must equal [`crate::PROTOCOL_VERSION`]
    pub protocol_version: u32,
    /// OS process id of the worker
    pub pid: u32,
    /// Logical CPUs visible to the worker
    pub cpu_count: u32,
}

impl WorkerInfo {
    /// Describe the calling process
    pub fn current() -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            pid: std::process::id(),
            cpu_count: std::thread::available_parallelism()
                .map(|p| p.get() as u32)
                .unwrap_or(1),
        }
    }
}

/// Commands sent from the supervisor to a worker
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum SupervisorCommand {
    /// Execute one task and reply with its outcome
    Run {
        /// Index of the task within the run
        task_id: u64,
        /// What to execute
        workload: WorkloadSpec,
    },
    /// Exit the worker loop
    Shutdown,
}

/// Messages sent from a worker to the supervisor
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum WorkerMessage {
    /// Handshake
    Hello(WorkerInfo),

    /// A task finished
    TaskComplete {
        /// Echo of the command's task id
        task_id: u64,
        /// Scalar produced by the workload
        value: f64,
        /// Duration measured inside the worker, informational only
        duration_nanos: u64,
    },

    /// A task returned an error or panicked
    TaskFailed {
        /// Echo of the command's task id
        task_id: u64,
        /// How the task failed
        kind: FailureKind,
        /// Human-readable reason
        message: String,
    },
}

/// How a task failed inside a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum FailureKind {
    /// The workload body panicked (caught in the worker)
    Panic,
    /// The workload body returned an error
    Error,
}
