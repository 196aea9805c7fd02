//! Nearest-Rank Percentiles
//!
//! `index = clamp(floor(q * len) - 1, 0, len - 1)` over the ascending sort.
//! No interpolation: the reported value is always one of the observed
//! durations, which keeps results reproducible across runs of the test suite.

use std::time::Duration;

/// Index of quantile `q` in an ascending slice of `len` elements.
///
/// Returns `None` for an empty slice.
pub fn nearest_rank_index(len: usize, q: f64) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let rank = (q * len as f64).floor() as i64 - 1;
    Some(rank.clamp(0, len as i64 - 1) as usize)
}

/// Quantile `q` of an already sorted slice, `Duration::ZERO` when empty
pub fn nearest_rank(sorted: &[Duration], q: f64) -> Duration {
    nearest_rank_index(sorted.len(), q)
        .map(|idx| sorted[idx])
        .unwrap_or(Duration::ZERO)
}

/// Quantile `q` of an unsorted slice; the input is left untouched
///
/// # Examples
///
/// ```
/// # use conbench_stats::percentile;
/// # use std::time::Duration;
/// let samples: Vec<Duration> = (1..=10).map(Duration::from_millis).collect();
/// assert_eq!(percentile(&samples, 0.95), Duration::from_millis(9));
/// ```
pub fn percentile(samples: &[Duration], q: f64) -> Duration {
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    nearest_rank(&sorted, q)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(values: impl IntoIterator<Item = u64>) -> Vec<Duration> {
        values.into_iter().map(Duration::from_millis).collect()
    }

    #[test]
    fn test_ten_samples_p95_and_p99_share_a_rank() {
        let samples = millis(1..=10);
        assert_eq!(nearest_rank_index(10, 0.95), Some(8));
        assert_eq!(nearest_rank_index(10, 0.99), Some(8));
        assert_eq!(percentile(&samples, 0.95), Duration::from_millis(9));
        assert_eq!(percentile(&samples, 0.99), Duration::from_millis(9));
    }

    #[test]
    fn test_hundred_samples() {
        let samples = millis(1..=100);
        assert_eq!(percentile(&samples, 0.95), Duration::from_millis(95));
        assert_eq!(percentile(&samples, 0.99), Duration::from_millis(99));
        assert_eq!(percentile(&samples, 0.50), Duration::from_millis(50));
    }

    #[test]
    fn test_single_sample_clamps_to_first() {
        assert_eq!(nearest_rank_index(1, 0.95), Some(0));
        assert_eq!(percentile(&millis([42]), 0.99), Duration::from_millis(42));
    }

    #[test]
    fn test_small_quantile_clamps_to_minimum() {
        let samples = millis([30, 10, 20]);
        assert_eq!(percentile(&samples, 0.0), Duration::from_millis(10));
    }

    #[test]
    fn test_quantile_one_is_maximum() {
        let samples = millis([5, 1, 3]);
        assert_eq!(percentile(&samples, 1.0), Duration::from_millis(5));
    }

    #[test]
    fn test_unsorted_input_is_not_modified() {
        let samples = millis([9, 1, 5, 3, 7]);
        let before = samples.clone();
        let p = percentile(&samples, 0.95);
        assert_eq!(p, Duration::from_millis(7));
        assert_eq!(samples, before);
    }

    #[test]
    fn test_empty_samples() {
        assert_eq!(nearest_rank_index(0, 0.95), None);
        assert_eq!(percentile(&[], 0.95), Duration::ZERO);
    }
}
