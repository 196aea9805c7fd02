//! Process-Pool Strategy
//!
//! C worker processes, each driven by its own job on a scoped rayon pool of
//! C threads.
//! Drivers pull task indices from a shared counter, so at most C tasks are in
//! flight. Only the workload description crosses the process boundary; the
//! scalar result comes back in the reply.
//!
//! Latency is measured here, from just before the command is written to just
//! after the reply is decoded. The worker's own measurement travels back too
//! but is only logged.

use super::{Collector, lock};
use crate::supervisor::{TaskReply, WorkerHandle};
use conbench_core::{Admission, RunError, RunOutcome, TaskConfig, WorkloadSpec};
use rayon::ThreadPoolBuilder;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, trace, warn};

pub(super) fn run(
    config: &TaskConfig,
    workload: WorkloadSpec,
    binary: Option<&Path>,
) -> Result<RunOutcome, RunError> {
    let count = config.effective_concurrency();
    let tasks = config.tasks();

    // Workers spawned before a failure are terminated when `workers` drops.
    let mut workers = Vec::with_capacity(count);
    for _ in 0..count {
        let worker = match binary {
            Some(path) => WorkerHandle::spawn_binary(path),
            None => WorkerHandle::spawn(),
        }
        .map_err(|e| RunError::resource("worker process", e))?;
        workers.push(worker);
    }
    debug!(workers = workers.len(), "worker pool ready");

    let next = AtomicUsize::new(0);
    let closed = AtomicBool::new(false);
    let collector = Mutex::new(Collector::new(tasks));

    let elapsed = ThreadPoolBuilder::new()
        .num_threads(count)
        .thread_name(|i| format!("conbench-driver-{i}"))
        .build_scoped(
            |thread| thread.run(),
            |pool| {
                let start = Instant::now();
                // One job per worker on a pool of exactly `count` threads, so
                // every worker has its own driver for the whole run.
                pool.scope(|scope| {
                    for worker in workers.iter_mut() {
                        let (workload, next, closed, collector) =
                            (&workload, &next, &closed, &collector);
                        scope.spawn(move |_| drive(worker, workload, tasks, next, closed, collector));
                    }
                });
                start.elapsed()
            },
        )
        .map_err(|e| RunError::resource("driver threads", e))?;

    for worker in workers {
        let pid = worker.pid();
        if let Err(e) = worker.shutdown() {
            warn!(pid, error = %e, "worker did not shut down cleanly");
        }
    }

    collector
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .finish(elapsed)
}

/// Feed tasks to one worker until the counter runs out or admission closes
fn drive(
    worker: &mut WorkerHandle,
    workload: &WorkloadSpec,
    tasks: usize,
    next: &AtomicUsize,
    closed: &AtomicBool,
    collector: &Mutex<Collector>,
) {
    loop {
        if closed.load(Ordering::Acquire) {
            return;
        }
        let task = next.fetch_add(1, Ordering::Relaxed);
        if task >= tasks {
            return;
        }

        let admission = Admission::now();
        let reply = worker.execute(task as u64, workload);
        let timing = admission.complete();

        let error = match reply {
            Ok(TaskReply::Complete {
                value,
                worker_duration,
            }) => {
                trace!(task, ?worker_duration, "task complete");
                lock(collector).record(value, timing);
                continue;
            }
            Ok(TaskReply::Failed { panicked, message }) => {
                let message = if panicked {
                    format!("panicked: {message}")
                } else {
                    message
                };
                RunError::workload(task as u64, message)
            }
            // crashed worker or broken pipe
            Err(e) => RunError::workload(task as u64, e.to_string()),
        };

        closed.store(true, Ordering::Release);
        lock(collector).fail(error);
    }
}
