//! Summary Statistics
//!
//! Aggregation rules for one measure of one variation:
//! - Failures are separated from values; min, max, average and p95 come from values only
//! - With no successful values those four statistics are `NaN`
//! - `failure_rate` divides failures by ALL samples, so partial failure is fractional
//! - `raw` keeps every sample in its original order for custom reporters

use crate::percentiles::{P95, nearest_rank};
use crate::sample::{Failure, MeasureKind, Sample};
use serde::Serialize;

/// Numeric summary of the successful samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
    /// Arithmetic mean
    pub average: f64,
    /// Nearest-rank 95th percentile
    pub p95: f64,
    /// Number of values summarized
    pub count: usize,
}

/// Summarize a set of values. Empty input yields `NaN` statistics.
pub fn summarize(values: &[f64]) -> Summary {
    if values.is_empty() {
        return Summary {
            min: f64::NAN,
            max: f64::NAN,
            average: f64::NAN,
            p95: f64::NAN,
            count: 0,
        };
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let sum: f64 = sorted.iter().sum();

    Summary {
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        average: sum / sorted.len() as f64,
        p95: nearest_rank(&sorted, P95),
        count: sorted.len(),
    }
}

/// Metadata attached to a computed result
#[derive(Debug, Clone, Default)]
pub struct ResultMeta {
    /// Unit family of the measure
    pub kind: Option<MeasureKind>,
    /// Number of measured iterations
    pub iterations: Option<usize>,
    /// Wall-clock milliseconds for the whole variation (setup, loop, teardown)
    pub total_duration: Option<f64>,
    /// Benchmark that produced the result
    pub benchmark_name: Option<String>,
    /// Variation that produced the result
    pub variation_name: Option<String>,
}

/// Aggregated result for one variation (or one secondary measure of it).
///
/// Immutable once produced; reporters receive it by reference.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkResult {
    /// Variation name, measure label, or watched span name
    pub label: String,
    /// Unit family of the measure
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<MeasureKind>,
    /// Smallest successful sample
    pub min: f64,
    /// Largest successful sample
    pub max: f64,
    /// Mean of successful samples
    pub average: f64,
    /// Nearest-rank 95th percentile of successful samples
    pub p95: f64,
    /// Every sample in iteration order
    pub raw: Vec<Sample>,
    /// Whether any iteration failed
    pub failed: bool,
    /// Failed samples divided by all samples
    pub failure_rate: f64,
    /// Secondary measures and watched spans
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subresults: Vec<BenchmarkResult>,
    /// Number of measured iterations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<usize>,
    /// Wall-clock milliseconds for the whole variation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<f64>,
    /// Benchmark that produced the result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmark_name: Option<String>,
    /// Variation that produced the result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation_name: Option<String>,
}

impl BenchmarkResult {
    /// Iterator over the failures recorded in `raw`
    pub fn failures(&self) -> impl Iterator<Item = &Failure> {
        self.raw.iter().filter_map(Sample::failure)
    }

    /// Iterator over the successful values recorded in `raw`
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.raw.iter().filter_map(Sample::value)
    }

    /// Copy relabelled `"total"`, for rendering a parent row above its
    /// subresults. Every other field, subresults included, is kept.
    pub fn as_total(&self) -> BenchmarkResult {
        BenchmarkResult {
            label: "total".to_string(),
            ..self.clone()
        }
    }
}

/// Compute the result for one label from its raw samples
pub fn compute_result(
    label: impl Into<String>,
    samples: Vec<Sample>,
    meta: ResultMeta,
) -> BenchmarkResult {
    let values: Vec<f64> = samples.iter().filter_map(Sample::value).collect();
    let failures = samples.len() - values.len();
    let summary = summarize(&values);

    let failure_rate = if samples.is_empty() {
        0.0
    } else {
        failures as f64 / samples.len() as f64
    };

    BenchmarkResult {
        label: label.into(),
        kind: meta.kind,
        min: summary.min,
        max: summary.max,
        average: summary.average,
        p95: summary.p95,
        raw: samples,
        failed: failures > 0,
        failure_rate,
        subresults: Vec::new(),
        iterations: meta.iterations,
        total_duration: meta.total_duration,
        benchmark_name: meta.benchmark_name,
        variation_name: meta.variation_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(v: &[f64]) -> Vec<Sample> {
        v.iter().copied().map(Sample::Value).collect()
    }

    #[test]
    fn test_basic_summary() {
        let summary = summarize(&[3.0, 1.0, 5.0, 2.0, 4.0]);

        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 5.0);
        assert!((summary.average - 3.0).abs() < f64::EPSILON);
        assert_eq!(summary.p95, 5.0);
        assert_eq!(summary.count, 5);
    }

    #[test]
    fn test_ordering_invariants() {
        let data = [12.5, 0.25, 7.0, 7.0, 99.0, 3.5, 41.0];
        let summary = summarize(&data);

        assert!(summary.min <= summary.average);
        assert!(summary.average <= summary.max);
        assert!(data.contains(&summary.p95));
    }

    #[test]
    fn test_empty_summary_is_nan() {
        let summary = summarize(&[]);
        assert!(summary.min.is_nan());
        assert!(summary.max.is_nan());
        assert!(summary.average.is_nan());
        assert!(summary.p95.is_nan());
        assert_eq!(summary.count, 0);
    }

    #[test]
    fn test_result_all_successful() {
        let result = compute_result("fast", values(&[2.0, 4.0]), ResultMeta::default());

        assert_eq!(result.label, "fast");
        assert!(!result.failed);
        assert_eq!(result.failure_rate, 0.0);
        assert!((result.average - 3.0).abs() < f64::EPSILON);
        assert_eq!(result.raw.len(), 2);
    }

    #[test]
    fn test_result_partial_failure() {
        let boom = Failure::msg("boom");
        let samples = vec![
            Sample::Value(1.0),
            Sample::Failed(boom.clone()),
            Sample::Value(3.0),
            Sample::Failed(boom),
        ];
        let result = compute_result("flaky", samples, ResultMeta::default());

        assert!(result.failed);
        assert!((result.failure_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(result.min, 1.0);
        assert_eq!(result.max, 3.0);
        // Raw keeps the interleaving
        assert!(result.raw[1].is_failure());
        assert_eq!(result.raw[2].value(), Some(3.0));
        assert_eq!(result.failures().count(), 2);
    }

    #[test]
    fn test_result_all_failed() {
        let samples = vec![Sample::Failed(Failure::msg("x")); 3];
        let result = compute_result("broken", samples, ResultMeta::default());

        assert!(result.failed);
        assert_eq!(result.failure_rate, 1.0);
        assert!(result.min.is_nan());
        assert!(result.p95.is_nan());
    }

    #[test]
    fn test_result_carries_meta() {
        let meta = ResultMeta {
            kind: Some(MeasureKind::Time),
            iterations: Some(2),
            total_duration: Some(12.5),
            benchmark_name: Some("parse".to_string()),
            variation_name: Some("small".to_string()),
        };
        let result = compute_result("small", values(&[1.0, 2.0]), meta);

        assert_eq!(result.kind, Some(MeasureKind::Time));
        assert_eq!(result.iterations, Some(2));
        assert_eq!(result.total_duration, Some(12.5));
        assert_eq!(result.benchmark_name.as_deref(), Some("parse"));
        assert_eq!(result.variation_name.as_deref(), Some("small"));
    }

    #[test]
    fn test_as_total_relabels_copy() {
        let meta = ResultMeta {
            kind: Some(MeasureKind::Time),
            benchmark_name: Some("parse".to_string()),
            ..Default::default()
        };
        let mut result = compute_result("v1", values(&[1.0, 3.0]), meta);
        result
            .subresults
            .push(compute_result("memory:rss", values(&[0.0]), ResultMeta::default()));

        let total = result.as_total();
        assert_eq!(total.label, "total");
        assert_eq!(total.subresults.len(), 1);
        assert_eq!(total.subresults[0].label, "memory:rss");
        assert_eq!(total.raw.len(), 2);
        assert_eq!(total.average, 2.0);
        assert_eq!(total.kind, Some(MeasureKind::Time));
        assert_eq!(total.benchmark_name.as_deref(), Some("parse"));
        assert_eq!(result.label, "v1");
        assert_eq!(result.subresults.len(), 1);
    }

    #[test]
    fn test_serializes_type_field() {
        let meta = ResultMeta {
            kind: Some(MeasureKind::Size),
            ..Default::default()
        };
        let result = compute_result("heap", values(&[8.0]), meta);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["type"], "size");
        assert_eq!(json["label"], "heap");
        assert!(json.get("subresults").is_none());
    }
}
