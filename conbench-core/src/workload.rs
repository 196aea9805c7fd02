//! Work Units
//!
//! A [`WorkUnit`] is the body one task executes. Executors treat it as opaque:
//! they only admit it, time it, and collect the scalar it returns.
//!
//! Two built-in workloads come from [`WorkloadSpec`]:
//! - simulated I/O: wait a uniformly random latency in `[min, max]`
//! - CPU-bound: sum `sqrt(i)` for `i` in `1..=iterations`

use crate::error::WorkError;
use conbench_ipc::WorkloadSpec;
use futures::future::BoxFuture;
use rand::Rng;
use std::hint::black_box;
use std::time::Duration;

/// Body of one task
pub trait WorkUnit: Send + Sync {
    /// Execute on the calling thread, blocking it for the task's duration
    fn run(&self) -> Result<f64, WorkError>;

    /// Execute under a cooperative scheduler.
    ///
    /// Waiting workloads should override this to suspend instead of blocking
    /// the event loop. The default runs [`WorkUnit::run`] when first polled.
    fn run_cooperative(&self) -> BoxFuture<'_, Result<f64, WorkError>> {
        Box::pin(async move { self.run() })
    }

    /// Serializable description, required to ship the unit to a worker
    /// process
    fn describe(&self) -> Option<WorkloadSpec> {
        None
    }
}

impl WorkUnit for WorkloadSpec {
    fn run(&self) -> Result<f64, WorkError> {
        match *self {
            WorkloadSpec::SimulatedIo { .. } => {
                let latency = sampled_latency(self);
                std::thread::sleep(latency);
                Ok(latency.as_secs_f64())
            }
            WorkloadSpec::CpuBound { iterations } => Ok(cpu_work(iterations)),
        }
    }

    fn run_cooperative(&self) -> BoxFuture<'_, Result<f64, WorkError>> {
        Box::pin(async move {
            match *self {
                WorkloadSpec::SimulatedIo { .. } => {
                    let latency = sampled_latency(self);
                    tokio::time::sleep(latency).await;
                    Ok(latency.as_secs_f64())
                }
                WorkloadSpec::CpuBound { iterations } => Ok(cpu_work(iterations)),
            }
        })
    }

    fn describe(&self) -> Option<WorkloadSpec> {
        Some(*self)
    }
}

fn sampled_latency(spec: &WorkloadSpec) -> Duration {
    spec.latency_bounds()
        .map(|(min, max)| draw_latency(min, max))
        .unwrap_or(Duration::ZERO)
}

/// Uniformly random latency in `[min, max]`; `min` when the range is empty
pub fn draw_latency(min: Duration, max: Duration) -> Duration {
    if min >= max {
        return min;
    }
    let lo = u64::try_from(min.as_nanos()).unwrap_or(u64::MAX);
    let hi = u64::try_from(max.as_nanos()).unwrap_or(u64::MAX);
    Duration::from_nanos(rand::thread_rng().gen_range(lo..=hi))
}

/// Sum of `sqrt(i)` for `i` in `1..=iterations`
pub fn cpu_work(iterations: u64) -> f64 {
    let mut total = 0.0;
    for i in 1..=black_box(iterations) {
        total += black_box(i as f64).sqrt();
    }
    total
}

/// Adapts a closure into a [`WorkUnit`]
pub struct FnUnit<F> {
    body: F,
}

impl<F> FnUnit<F>
where
    F: Fn() -> Result<f64, WorkError> + Send + Sync,
{
    /// Wrap `body`
    pub fn new(body: F) -> Self {
        Self { body }
    }
}

impl<F> WorkUnit for FnUnit<F>
where
    F: Fn() -> Result<f64, WorkError> + Send + Sync,
{
    fn run(&self) -> Result<f64, WorkError> {
        (self.body)()
    }
}
