//! Thread-Pool Strategy
//!
//! A dedicated rayon pool of exactly C threads. All N jobs are queued at once;
//! a job is admitted when a pool thread picks it up, so the cap is the thread
//! count itself. The pool is built with `build_scoped`, which joins every
//! thread before returning.

use super::{Collector, lock, settle};
use conbench_core::{LatencyRecorder, RunError, RunOutcome, TaskConfig, WorkUnit};
use rayon::ThreadPoolBuilder;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

pub(super) fn run(config: &TaskConfig, unit: Arc<dyn WorkUnit>) -> Result<RunOutcome, RunError> {
    let threads = config.effective_concurrency();
    let tasks = config.tasks();
    let collector = Mutex::new(Collector::new(tasks));
    let closed = AtomicBool::new(false);

    let elapsed = ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("conbench-pool-{i}"))
        .build_scoped(
            |thread| thread.run(),
            |pool| {
                debug!(threads, "thread pool ready");
                let start = Instant::now();
                pool.scope(|scope| {
                    for task in 0..tasks {
                        let unit = &unit;
                        let collector = &collector;
                        let closed = &closed;
                        scope.spawn(move |_| {
                            // Admission is closed after the first failure.
                            if closed.load(Ordering::Acquire) {
                                return;
                            }
                            let (attempt, timing) = LatencyRecorder::record(|| {
                                catch_unwind(AssertUnwindSafe(|| unit.run()))
                            });
                            let settled = settle(task, attempt);
                            let mut collector = lock(collector);
                            match settled {
                                Ok(value) => collector.record(value, timing),
                                Err(error) => {
                                    closed.store(true, Ordering::Release);
                                    collector.fail(error);
                                }
                            }
                        });
                    }
                });
                start.elapsed()
            },
        )
        .map_err(|e| RunError::resource("thread pool", e))?;

    collector
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .finish(elapsed)
}
