#![warn(missing_docs)]
//! Conbench Statistics
//!
//! Reduces the per-task durations of one run into a [`RunStats`] record:
//! - wall-clock elapsed time and throughput (tasks per second)
//! - arithmetic mean latency
//! - nearest-rank percentiles (p50, p95, p99), no interpolation
//! - speedup of one run relative to a baseline run
//!
//! Everything here is a pure function of its inputs.

mod percentiles;
mod summary;

pub use percentiles::{nearest_rank, nearest_rank_index, percentile};
pub use summary::{RunStats, aggregate, mean, speedup, throughput};

/// Quantile reported as p95
pub const P95: f64 = 0.95;

/// Quantile reported as p99
pub const P99: f64 = 0.99;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reported_quantiles() {
        assert!((P95 - 0.95).abs() < f64::EPSILON);
        assert!((P99 - 0.99).abs() < f64::EPSILON);
    }
}
