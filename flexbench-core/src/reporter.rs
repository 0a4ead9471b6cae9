//! Reporters
//!
//! Reporters receive results; they never influence a run. Benchmarks talk to a
//! [`BenchmarkReporter`], suites to a [`SuiteReporter`]. Every callback except
//! `report` has a no-op default.

use crate::benchmark::Benchmark;
use crate::suite::SuiteResults;
use flexbench_stats::{BenchmarkResult, MeasureKind};
use std::sync::Arc;
use std::time::Duration;

/// Snapshot passed with every progress callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressContext {
    /// Iterations across all variations, when known up front
    pub total_iterations: Option<usize>,
    /// Iterations completed across all variations
    pub completed_iterations: usize,
    /// Configured timeout
    pub timeout: Option<Duration>,
    /// Time since the benchmark started
    pub time_elapsed: Duration,
}

/// Receives progress and results of one benchmark
pub trait BenchmarkReporter: Send + Sync {
    /// Progress update. `fraction` is in `0.0..=1.0`.
    ///
    /// With a known iteration count this fires after every iteration;
    /// timeout-only runs get one coarse update per variation.
    fn progress(&self, _variation: &str, _fraction: f64, _context: &ProgressContext) {}

    /// Final results, one per variation
    fn report(&self, benchmark: &Benchmark, results: &[BenchmarkResult]);
}

/// Receives lifecycle events and results of a suite
pub trait SuiteReporter: Send + Sync {
    /// Suite started
    fn on_suite_start(&self, _name: &str) {}

    /// Number of benchmarks about to run
    fn set_total_benchmarks(&self, _count: usize) {}

    /// Benchmark started
    fn on_benchmark_start(&self, _name: &str) {}

    /// Benchmark finished
    fn on_benchmark_end(&self, _name: &str, _results: &[BenchmarkResult]) {}

    /// Final results keyed by benchmark name
    fn report(&self, results: &SuiteResults);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl BenchmarkReporter for NoopReporter {
    fn report(&self, _benchmark: &Benchmark, _results: &[BenchmarkResult]) {}
}

impl SuiteReporter for NoopReporter {
    fn report(&self, _results: &SuiteResults) {}
}

/// Default reporter: progress at `debug`, results at `info`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl BenchmarkReporter for TracingReporter {
    fn progress(&self, variation: &str, fraction: f64, context: &ProgressContext) {
        tracing::debug!(
            variation,
            progress = %format!("{:.0}%", fraction * 100.0),
            completed = context.completed_iterations,
            total = ?context.total_iterations,
            elapsed_ms = context.time_elapsed.as_millis() as u64,
            "benchmark progress"
        );
    }

    fn report(&self, benchmark: &Benchmark, results: &[BenchmarkResult]) {
        for result in results {
            log_result(benchmark.name(), result);
        }
    }
}

impl SuiteReporter for TracingReporter {
    fn on_suite_start(&self, name: &str) {
        tracing::info!(suite = name, "suite started");
    }

    fn on_benchmark_start(&self, name: &str) {
        tracing::debug!(benchmark = name, "benchmark started");
    }

    fn on_benchmark_end(&self, name: &str, results: &[BenchmarkResult]) {
        tracing::debug!(
            benchmark = name,
            variations = results.len(),
            "benchmark finished"
        );
    }

    fn report(&self, results: &SuiteResults) {
        for (benchmark, results) in results.iter() {
            for result in results {
                log_result(benchmark, result);
            }
        }
    }
}

fn log_result(benchmark: &str, result: &BenchmarkResult) {
    let total;
    let (parent, subresults) = if result.subresults.is_empty() {
        (result, &[][..])
    } else {
        total = result.as_total();
        (&total, &result.subresults[..])
    };

    tracing::info!(
        benchmark,
        variation = %result.label,
        label = %parent.label,
        average = %format_value(parent.kind, parent.average),
        min = %format_value(parent.kind, parent.min),
        max = %format_value(parent.kind, parent.max),
        p95 = %format_value(parent.kind, parent.p95),
        iterations = parent.raw.len(),
        failure_rate = parent.failure_rate,
        "result"
    );
    for sub in subresults {
        tracing::info!(
            benchmark,
            variation = %result.label,
            label = %sub.label,
            average = %format_value(sub.kind, sub.average),
            p95 = %format_value(sub.kind, sub.p95),
            failure_rate = sub.failure_rate,
            "subresult"
        );
    }
    if result.failed {
        if let Some(first) = result.failures().next() {
            tracing::warn!(
                benchmark,
                variation = %result.label,
                failure_rate = result.failure_rate,
                error = %first,
                "iterations failed"
            );
        }
    }
}

/// Render a statistic in its unit
pub fn format_value(kind: Option<MeasureKind>, value: f64) -> String {
    if value.is_nan() {
        return "n/a".to_string();
    }
    match kind {
        Some(MeasureKind::Time) if value >= 1000.0 => format!("{:.2}s", value / 1000.0),
        Some(MeasureKind::Time) if value < 1.0 => format!("{:.2}µs", value * 1000.0),
        Some(MeasureKind::Time) => format!("{value:.2}ms"),
        Some(MeasureKind::Size) => format_bytes(value),
        None => format!("{value:.2}"),
    }
}

fn format_bytes(bytes: f64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value:.0}{}", UNITS[unit])
    } else {
        format!("{value:.2}{}", UNITS[unit])
    }
}

/// Fans every event out to several reporters
#[derive(Clone, Default)]
pub struct CompositeReporter {
    suite: Vec<Arc<dyn SuiteReporter>>,
    benchmark: Vec<Arc<dyn BenchmarkReporter>>,
}

impl CompositeReporter {
    /// No reporters
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward suite events to `reporter`
    pub fn with_suite_reporter(mut self, reporter: impl SuiteReporter + 'static) -> Self {
        self.suite.push(Arc::new(reporter));
        self
    }

    /// Forward benchmark events to `reporter`
    pub fn with_benchmark_reporter(mut self, reporter: impl BenchmarkReporter + 'static) -> Self {
        self.benchmark.push(Arc::new(reporter));
        self
    }
}

impl SuiteReporter for CompositeReporter {
    fn on_suite_start(&self, name: &str) {
        self.suite.iter().for_each(|r| r.on_suite_start(name));
    }

    fn set_total_benchmarks(&self, count: usize) {
        self.suite.iter().for_each(|r| r.set_total_benchmarks(count));
    }

    fn on_benchmark_start(&self, name: &str) {
        self.suite.iter().for_each(|r| r.on_benchmark_start(name));
    }

    fn on_benchmark_end(&self, name: &str, results: &[BenchmarkResult]) {
        self.suite
            .iter()
            .for_each(|r| r.on_benchmark_end(name, results));
    }

    fn report(&self, results: &SuiteResults) {
        self.suite.iter().for_each(|r| r.report(results));
    }
}

impl BenchmarkReporter for CompositeReporter {
    fn progress(&self, variation: &str, fraction: f64, context: &ProgressContext) {
        self.benchmark
            .iter()
            .for_each(|r| r.progress(variation, fraction, context));
    }

    fn report(&self, benchmark: &Benchmark, results: &[BenchmarkResult]) {
        self.benchmark
            .iter()
            .for_each(|r| r.report(benchmark, results));
    }
}
