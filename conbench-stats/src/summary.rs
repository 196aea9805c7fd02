//! Run Summary
//!
//! `RunStats` is computed once, after every task of a run has completed. It is
//! never built from a partial result set: executors refuse to hand out fewer
//! durations than tasks, so `count` always equals the configured task count.

use crate::percentiles::nearest_rank;
use crate::{P95, P99};
use std::time::Duration;

/// Aggregated statistics of one run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunStats {
    /// Wall-clock time from first admission to last completion
    pub elapsed: Duration,
    /// Completed tasks per second, `f64::INFINITY` when `elapsed` is zero
    pub throughput: f64,
    /// Arithmetic mean latency
    pub mean: Duration,
    /// Median latency (nearest rank)
    pub p50: Duration,
    /// 95th percentile latency (nearest rank)
    pub p95: Duration,
    /// 99th percentile latency (nearest rank)
    pub p99: Duration,
    /// Fastest task
    pub min: Duration,
    /// Slowest task
    pub max: Duration,
    /// Number of durations aggregated
    pub count: usize,
}

impl RunStats {
    /// Mean latency in fractional milliseconds
    pub fn mean_ms(&self) -> f64 {
        as_millis_f64(self.mean)
    }

    /// p95 latency in fractional milliseconds
    pub fn p95_ms(&self) -> f64 {
        as_millis_f64(self.p95)
    }

    /// p99 latency in fractional milliseconds
    pub fn p99_ms(&self) -> f64 {
        as_millis_f64(self.p99)
    }
}

fn as_millis_f64(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}

/// Reduce a run's elapsed time and per-task durations into [`RunStats`]
///
/// # Examples
///
/// ```
/// # use conbench_stats::aggregate;
/// # use std::time::Duration;
/// let durations: Vec<Duration> = (1..=10).map(Duration::from_millis).collect();
/// let stats = aggregate(Duration::from_secs(2), &durations);
/// assert_eq!(stats.count, 10);
/// assert_eq!(stats.throughput, 5.0);
/// assert_eq!(stats.p99, Duration::from_millis(9));
/// ```
pub fn aggregate(elapsed: Duration, durations: &[Duration]) -> RunStats {
    let mut sorted = durations.to_vec();
    sorted.sort_unstable();

    RunStats {
        elapsed,
        throughput: throughput(sorted.len(), elapsed),
        mean: mean(&sorted),
        p50: nearest_rank(&sorted, 0.50),
        p95: nearest_rank(&sorted, P95),
        p99: nearest_rank(&sorted, P99),
        min: sorted.first().copied().unwrap_or(Duration::ZERO),
        max: sorted.last().copied().unwrap_or(Duration::ZERO),
        count: sorted.len(),
    }
}

/// Arithmetic mean, `Duration::ZERO` for an empty slice.
///
/// Accumulates whole nanoseconds so the result is exact up to truncation.
pub fn mean(durations: &[Duration]) -> Duration {
    if durations.is_empty() {
        return Duration::ZERO;
    }
    let total: u128 = durations.iter().map(Duration::as_nanos).sum();
    let avg = total / durations.len() as u128;
    Duration::from_nanos(u64::try_from(avg).unwrap_or(u64::MAX))
}

/// Tasks per second over `elapsed`
pub fn throughput(count: usize, elapsed: Duration) -> f64 {
    if elapsed.is_zero() {
        f64::INFINITY
    } else {
        count as f64 / elapsed.as_secs_f64()
    }
}

/// How many times faster `candidate` finished than `baseline`
pub fn speedup(baseline: &RunStats, candidate: &RunStats) -> f64 {
    if candidate.elapsed.is_zero() {
        f64::INFINITY
    } else {
        baseline.elapsed.as_secs_f64() / candidate.elapsed.as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(values: impl IntoIterator<Item = u64>) -> Vec<Duration> {
        values.into_iter().map(Duration::from_millis).collect()
    }

    #[test]
    fn test_basic_summary() {
        let stats = aggregate(Duration::from_secs(1), &millis(1..=10));

        assert_eq!(stats.count, 10);
        assert_eq!(stats.mean, Duration::from_micros(5_500));
        assert_eq!(stats.p50, Duration::from_millis(5));
        assert_eq!(stats.p95, Duration::from_millis(9));
        assert_eq!(stats.p99, Duration::from_millis(9));
        assert_eq!(stats.min, Duration::from_millis(1));
        assert_eq!(stats.max, Duration::from_millis(10));
        assert!((stats.throughput - 10.0).abs() < 1e-9);
        assert!((stats.mean_ms() - 5.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_samples() {
        let stats = aggregate(Duration::from_millis(3), &[]);

        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean, Duration::ZERO);
        assert_eq!(stats.p95, Duration::ZERO);
        assert_eq!(stats.p99, Duration::ZERO);
        assert_eq!(stats.min, Duration::ZERO);
        assert_eq!(stats.max, Duration::ZERO);
        assert_eq!(stats.throughput, 0.0);
    }

    #[test]
    fn test_throughput_matches_count_over_elapsed() {
        let stats = aggregate(Duration::from_millis(250), &millis([10; 50]));
        assert!((stats.throughput - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_elapsed_is_infinite_throughput() {
        let stats = aggregate(Duration::ZERO, &millis([1, 2]));
        assert!(stats.throughput.is_infinite());
        assert!(stats.throughput > 0.0);
        // comparisons stay well-defined
        assert!(stats.throughput > f64::MAX);
    }

    #[test]
    fn test_input_order_is_irrelevant() {
        let forward = aggregate(Duration::from_secs(1), &millis(1..=20));
        let reverse = aggregate(Duration::from_secs(1), &millis((1..=20).rev()));
        assert_eq!(forward, reverse);
    }

    #[test]
    fn test_speedup() {
        let baseline = aggregate(Duration::from_secs(4), &millis([20; 4]));
        let parallel = aggregate(Duration::from_secs(1), &millis([20; 4]));
        assert!((speedup(&baseline, &parallel) - 4.0).abs() < 1e-9);

        let instant = aggregate(Duration::ZERO, &millis([1]));
        assert!(speedup(&baseline, &instant).is_infinite());
    }

    #[test]
    fn test_mean_truncates_to_whole_nanos() {
        let durations = [Duration::from_nanos(1), Duration::from_nanos(2)];
        assert_eq!(mean(&durations), Duration::from_nanos(1));
    }
}
