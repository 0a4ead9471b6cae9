//! Percentile Computation
//!
//! Nearest-rank percentiles over an ascending slice. The rank is
//! `floor(n * p)`, clamped to the last element, so the value returned is
//! always a member of the sample set.

/// Fraction used for the p95 column of every result
pub const P95: f64 = 0.95;

/// Nearest-rank percentile of an already sorted slice.
///
/// `fraction` is in `0.0..=1.0`. Returns `NaN` for an empty slice.
///
/// # Examples
///
/// ```
/// # use flexbench_stats::nearest_rank;
/// let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
/// assert_eq!(nearest_rank(&sorted, 0.95), 5.0);
/// assert_eq!(nearest_rank(&sorted, 0.5), 3.0);
/// ```
pub fn nearest_rank(sorted: &[f64], fraction: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }

    let rank = (sorted.len() as f64 * fraction).floor() as usize;
    sorted[rank.min(sorted.len() - 1)]
}
