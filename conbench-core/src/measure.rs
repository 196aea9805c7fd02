//! Latency Recording
//!
//! Every task gets a [`TaskTiming`]: the instant it was admitted for execution
//! and the instant its body returned. Both come from `std::time::Instant`, a
//! monotonic clock, so wall-clock adjustments can't produce negative or
//! inflated durations.
//!
//! Admission is the moment the task actually starts running under the
//! concurrency cap. Time spent queued for a slot is deliberately not part of
//! the task's latency.

use conbench_stats::{RunStats, aggregate};
use std::future::Future;
use std::time::{Duration, Instant};

/// A task that has been admitted and is now running
#[derive(Debug)]
#[must_use = "an admission records nothing until it is completed"]
pub struct Admission {
    admitted: Instant,
}

impl Admission {
    /// Mark the task as admitted now
    #[inline(always)]
    pub fn now() -> Self {
        Self {
            admitted: Instant::now(),
        }
    }

    /// When the task was admitted
    pub fn admitted(&self) -> Instant {
        self.admitted
    }

    /// Mark the task as completed now
    #[inline(always)]
    pub fn complete(self) -> TaskTiming {
        TaskTiming {
            admitted: self.admitted,
            completed: Instant::now(),
        }
    }
}

/// Admitted-start and completion instants of one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskTiming {
    admitted: Instant,
    completed: Instant,
}

impl TaskTiming {
    /// Pair two instants taken by the caller; `completed` earlier than
    /// `admitted` yields a zero duration
    pub fn new(admitted: Instant, completed: Instant) -> Self {
        Self {
            admitted,
            completed,
        }
    }

    /// When the task was admitted
    pub fn admitted(&self) -> Instant {
        self.admitted
    }

    /// When the task's body returned
    pub fn completed(&self) -> Instant {
        self.completed
    }

    /// Task latency, never negative
    pub fn duration(&self) -> Duration {
        self.completed.saturating_duration_since(self.admitted)
    }
}

/// Times work unit bodies
pub struct LatencyRecorder;

impl LatencyRecorder {
    /// Run `body`, timestamping immediately before and after it
    #[inline]
    pub fn record<T, F>(body: F) -> (T, TaskTiming)
    where
        F: FnOnce() -> T,
    {
        let admission = Admission::now();
        let value = body();
        (value, admission.complete())
    }

    /// Drive `body` to completion, timestamping when it is first polled and
    /// when it resolves
    pub async fn record_async<F>(body: F) -> (F::Output, TaskTiming)
    where
        F: Future,
    {
        let admission = Admission::now();
        let value = body.await;
        (value, admission.complete())
    }
}

/// Everything an executor returns for a successful run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Wall-clock time of the whole run
    pub elapsed: Duration,
    /// One timing per task, in completion order
    pub timings: Vec<TaskTiming>,
    /// Sum of the scalar values returned by the tasks
    pub checksum: f64,
}

impl RunOutcome {
    /// Per-task latencies
    pub fn durations(&self) -> Vec<Duration> {
        self.timings.iter().map(TaskTiming::duration).collect()
    }

    /// Aggregate into throughput and latency statistics
    pub fn stats(&self) -> RunStats {
        aggregate(self.elapsed, &self.durations())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_measures_body() {
        let (value, timing) = LatencyRecorder::record(|| {
            std::thread::sleep(Duration::from_millis(10));
            7
        });

        assert_eq!(value, 7);
        assert!(timing.duration() >= Duration::from_millis(10));
        assert!(timing.duration() < Duration::from_millis(500));
        assert!(timing.completed() >= timing.admitted());
    }

    #[test]
    fn test_admission_is_not_submission() {
        // Time spent before admission (queueing) must not show up in the latency.
        let submitted = Instant::now();
        std::thread::sleep(Duration::from_millis(20));
        let (_, timing) = LatencyRecorder::record(|| ());

        assert!(timing.admitted() >= submitted + Duration::from_millis(20));
        assert!(timing.duration() < Duration::from_millis(20));
    }

    #[test]
    fn test_reversed_instants_saturate_to_zero() {
        let later = Instant::now();
        let earlier = later - Duration::from_millis(1);
        assert_eq!(TaskTiming::new(later, earlier).duration(), Duration::ZERO);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_record_async_starts_at_first_poll() {
        let body = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            "done"
        };
        // The future is created here but must not be timed until awaited.
        std::thread::sleep(Duration::from_millis(15));
        let awaited = Instant::now();
        let (value, timing) = LatencyRecorder::record_async(body).await;

        assert_eq!(value, "done");
        assert!(timing.admitted() >= awaited);
        assert!(timing.duration() >= Duration::from_millis(10));
    }

    #[test]
    fn test_outcome_stats() {
        let base = Instant::now();
        let timings = (1..=4u64)
            .map(|ms| TaskTiming::new(base, base + Duration::from_millis(ms)))
            .collect();
        let outcome = RunOutcome {
            elapsed: Duration::from_millis(4),
            timings,
            checksum: 0.0,
        };

        let stats = outcome.stats();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.max, Duration::from_millis(4));
        assert!((stats.throughput - 1_000.0).abs() < 1e-6);
    }
}
