//! Cooperative Strategy
//!
//! All N tasks are spawned up front on a single-threaded tokio runtime; a
//! semaphore with C permits is the admission gate. A task starts its timer
//! only after it holds a permit, so time spent queued for a slot never counts
//! towards its latency. Tokio's semaphore is fair, so admission is FIFO.
//!
//! Closing the semaphore after the first failure turns every pending
//! `acquire` into an error: queued tasks exit without running while admitted
//! ones finish normally.

use super::{Collector, panicked, settle};
use conbench_core::{LatencyRecorder, RunError, RunOutcome, TaskConfig, WorkUnit};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

pub(super) fn run(config: &TaskConfig, unit: Arc<dyn WorkUnit>) -> Result<RunOutcome, RunError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| RunError::resource("event loop", e))?;

    // Dropping the runtime at the end of this scope cancels nothing: every
    // spawned task has been joined by then.
    runtime.block_on(drive(config.tasks(), config.effective_concurrency(), unit))
}

async fn drive(
    tasks: usize,
    permits: usize,
    unit: Arc<dyn WorkUnit>,
) -> Result<RunOutcome, RunError> {
    let gate = Arc::new(Semaphore::new(permits));
    let mut set = JoinSet::new();
    let mut collector = Collector::new(tasks);
    debug!(permits, "event loop ready");

    let start = Instant::now();
    for task in 0..tasks {
        let gate = Arc::clone(&gate);
        let unit = Arc::clone(&unit);
        set.spawn(async move {
            let Ok(_permit) = gate.acquire_owned().await else {
                return (task, None);
            };
            let body = AssertUnwindSafe(LatencyRecorder::record_async(unit.run_cooperative()));
            (task, Some(body.catch_unwind().await))
        });
    }

    while let Some(joined) = set.join_next().await {
        let settled = match joined {
            // never admitted
            Ok((_, None)) => continue,
            Ok((task, Some(Ok((result, timing))))) => {
                settle(task, Ok(result)).map(|value| (value, timing))
            }
            Ok((task, Some(Err(payload)))) => Err(panicked(task, payload)),
            // Panics are caught inside the task, so this is a cancellation.
            // The missing timing surfaces as an incomplete run.
            Err(e) => {
                warn!(error = %e, "task did not run to completion");
                continue;
            }
        };
        match settled {
            Ok((value, timing)) => collector.record(value, timing),
            Err(error) => {
                gate.close();
                collector.fail(error);
            }
        }
    }

    collector.finish(start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use conbench_core::{FnUnit, Strategy, WorkError, WorkloadSpec};
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config(tasks: usize, concurrency: usize, latency_ms: u64) -> TaskConfig {
        let latency = Duration::from_millis(latency_ms);
        TaskConfig::new(
            tasks,
            concurrency,
            WorkloadSpec::simulated_io(latency, latency),
            Strategy::Cooperative,
        )
        .unwrap()
    }

    /// Suspending unit that tracks how many bodies are in flight
    struct Probe {
        active: AtomicUsize,
        peak: AtomicUsize,
        fail_at: Option<usize>,
        started: AtomicUsize,
    }

    impl Probe {
        fn new(fail_at: Option<usize>) -> Self {
            Self {
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                fail_at,
                started: AtomicUsize::new(0),
            }
        }
    }

    impl WorkUnit for Probe {
        fn run(&self) -> Result<f64, WorkError> {
            unreachable!("cooperative strategy must use run_cooperative")
        }

        fn run_cooperative(&self) -> BoxFuture<'_, Result<f64, WorkError>> {
            Box::pin(async move {
                let n = self.started.fetch_add(1, Ordering::SeqCst);
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                self.active.fetch_sub(1, Ordering::SeqCst);
                if Some(n) == self.fail_at {
                    return Err(WorkError::new("probe failure"));
                }
                Ok(1.0)
            })
        }
    }

    #[test]
    fn test_io_tasks_overlap_on_one_thread() {
        let cfg = config(20, 20, 30);
        let outcome = run(&cfg, Arc::new(*cfg.workload())).unwrap();

        assert_eq!(outcome.timings.len(), 20);
        // 20 concurrent 30ms waits take roughly one wait, not 600ms
        assert!(outcome.elapsed < Duration::from_millis(300));
        for timing in &outcome.timings {
            assert!(timing.duration() >= Duration::from_millis(30));
        }
    }

    #[test]
    fn test_semaphore_caps_admission() {
        let probe = Arc::new(Probe::new(None));
        let outcome = run(&config(30, 4, 1), probe.clone()).unwrap();

        assert_eq!(outcome.timings.len(), 30);
        assert_eq!(probe.peak.load(Ordering::SeqCst), 4);
        assert_eq!(probe.active.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_queue_time_is_not_latency() {
        // With one permit, later tasks wait ~10ms each but report ~10ms latency.
        let cfg = config(5, 1, 10);
        let outcome = run(&cfg, Arc::new(*cfg.workload())).unwrap();

        assert!(outcome.elapsed >= Duration::from_millis(50));
        let stats = outcome.stats();
        assert!(stats.max < Duration::from_millis(40), "max = {:?}", stats.max);
    }

    #[test]
    fn test_failure_closes_admission() {
        let probe = Arc::new(Probe::new(Some(1)));
        let err = run(&config(100, 2, 1), probe.clone()).unwrap_err();

        assert!(
            matches!(err, RunError::Workload { ref message, .. } if message == "probe failure")
        );
        assert!(probe.started.load(Ordering::SeqCst) < 100);
        assert_eq!(probe.active.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_blocking_unit_still_completes() {
        let unit = FnUnit::new(|| Ok(2.0));
        let outcome = run(&config(8, 3, 1), Arc::new(unit)).unwrap();
        assert_eq!(outcome.timings.len(), 8);
        assert_eq!(outcome.checksum, 16.0);
    }
}
