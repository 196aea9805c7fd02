//! Error Types

use std::any::Any;
use std::time::Duration;
use thiserror::Error;

/// Invalid run parameters, detected before any work starts
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// N was zero
    #[error("task count must be at least 1")]
    NoTasks,

    /// C was zero
    #[error("concurrency limit must be at least 1")]
    NoConcurrency,

    /// A latency in seconds was negative, not finite or out of range
    #[error("invalid latency {value}s: {reason}")]
    InvalidLatency {
        /// Value as given
        value: f64,
        /// Why it was rejected
        reason: String,
    },

    /// The simulated latency range is inverted
    #[error("minimum latency {min:?} is greater than maximum latency {max:?}")]
    LatencyBounds {
        /// Lower bound
        min: Duration,
        /// Upper bound
        max: Duration,
    },

    /// Strategy name not recognised
    #[error(
        "unknown strategy '{0}' (expected cooperative, thread-pool, process-pool or sequential)"
    )]
    UnknownStrategy(String),

    /// The workload has no description a worker process can run
    #[error("the {0} strategy needs a workload that can be sent to a worker process")]
    NotPortable(&'static str),
}

/// Failure reported by a work unit body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct WorkError {
    message: String,
}

impl WorkError {
    /// Create an error carrying `message`
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure reason
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Why a run produced no statistics
#[derive(Debug, Error)]
pub enum RunError {
    /// Rejected before any work started
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A task failed. Tasks that were already admitted were allowed to
    /// finish before this was returned.
    #[error("task {task} failed: {message}")]
    Workload {
        /// Index of the failing task
        task: u64,
        /// Error text, prefixed with `panicked:` for panics
        message: String,
    },

    /// A pool, runtime or worker process could not be created
    #[error("failed to create {resource}: {message}")]
    ResourceExhausted {
        /// What could not be created
        resource: &'static str,
        /// Underlying OS or library error
        message: String,
    },

    /// Fewer timings than tasks came back
    #[error("run finished with {got} results, expected {expected}")]
    Incomplete {
        /// Configured task count
        expected: usize,
        /// Timings collected
        got: usize,
    },
}

impl RunError {
    /// Convenience constructor for [`RunError::Workload`]
    pub fn workload(task: u64, message: impl Into<String>) -> Self {
        RunError::Workload {
            task,
            message: message.into(),
        }
    }

    /// Convenience constructor for [`RunError::ResourceExhausted`]
    pub fn resource(resource: &'static str, message: impl ToString) -> Self {
        RunError::ResourceExhausted {
            resource,
            message: message.to_string(),
        }
    }
}

/// Best-effort text of a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        let static_str: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(17u8);

        assert_eq!(panic_message(static_str.as_ref()), "static");
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }

    #[test]
    fn test_config_error_converts_into_run_error() {
        let err: RunError = ConfigError::NoTasks.into();
        assert!(matches!(err, RunError::Config(ConfigError::NoTasks)));
        assert_eq!(
            err.to_string(),
            "invalid configuration: task count must be at least 1"
        );
    }

    #[test]
    fn test_workload_error_display() {
        let err = RunError::workload(3, "disk on fire");
        assert_eq!(err.to_string(), "task 3 failed: disk on fire");
    }
}
