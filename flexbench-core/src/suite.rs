//! Suites
//!
//! A suite runs its benchmarks one after another and collects their results by
//! benchmark name. Suite-level variations are appended to every benchmark;
//! suite-level measures and benchmark reporter only fill in where a benchmark
//! has none of its own. The error strategy reaches benchmarks only when the
//! suite was told to propagate it.

use crate::benchmark::Benchmark;
use crate::error::{BenchError, ErrorStrategy};
use crate::measure::SharedMeasure;
use crate::reporter::{BenchmarkReporter, SuiteReporter, TracingReporter};
use crate::variation::Variation;
use flexbench_stats::BenchmarkResult;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use std::sync::Arc;

/// Results keyed by benchmark name, in run order
#[derive(Debug, Clone, Default)]
pub struct SuiteResults {
    entries: Vec<(String, Vec<BenchmarkResult>)>,
}

impl SuiteResults {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Store results for `name`; an existing entry is replaced in place
    pub fn insert(&mut self, name: impl Into<String>, results: Vec<BenchmarkResult>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = results,
            None => self.entries.push((name, results)),
        }
    }

    /// Results of one benchmark
    pub fn get(&self, name: &str) -> Option<&[BenchmarkResult]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, results)| results.as_slice())
    }

    /// Benchmark names in run order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// `(name, results)` pairs in run order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[BenchmarkResult])> {
        self.entries
            .iter()
            .map(|(name, results)| (name.as_str(), results.as_slice()))
    }

    /// Number of benchmarks
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no benchmark has results
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Results across all benchmarks
    pub fn result_count(&self) -> usize {
        self.entries.iter().map(|(_, results)| results.len()).sum()
    }

    /// Failed results across all benchmarks
    pub fn failed_count(&self) -> usize {
        self.entries
            .iter()
            .flat_map(|(_, results)| results)
            .filter(|result| result.failed)
            .count()
    }
}

impl Serialize for SuiteResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, results) in &self.entries {
            map.serialize_entry(name, results)?;
        }
        map.end()
    }
}

/// Ordered collection of benchmarks run together
#[derive(Clone)]
pub struct Suite {
    name: String,
    benchmarks: Vec<Benchmark>,
    variations: Vec<Arc<Variation>>,
    reporter: Arc<dyn SuiteReporter>,
    benchmark_reporter: Option<Arc<dyn BenchmarkReporter>>,
    measures: Option<Vec<SharedMeasure>>,
    error_strategy: Option<ErrorStrategy>,
    propagate_error_strategy: bool,
}

impl Suite {
    /// Empty suite reporting through the log
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            benchmarks: Vec::new(),
            variations: Vec::new(),
            reporter: Arc::new(TracingReporter),
            benchmark_reporter: None,
            measures: None,
            error_strategy: None,
            propagate_error_strategy: false,
        }
    }

    /// Suite name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Benchmarks in run order
    pub fn benchmarks(&self) -> &[Benchmark] {
        &self.benchmarks
    }

    /// Append a benchmark
    pub fn add_benchmark(mut self, benchmark: Benchmark) -> Self {
        self.benchmarks.push(benchmark);
        self
    }

    /// Append a benchmark in place
    pub fn push_benchmark(&mut self, benchmark: Benchmark) {
        self.benchmarks.push(benchmark);
    }

    /// Variation appended to every benchmark
    pub fn with_variation(mut self, variation: impl Into<Arc<Variation>>) -> Self {
        self.variations.push(variation.into());
        self
    }

    /// Variations appended to every benchmark
    pub fn with_variations<V: Into<Arc<Variation>>>(
        mut self,
        variations: impl IntoIterator<Item = V>,
    ) -> Self {
        self.variations.extend(variations.into_iter().map(Into::into));
        self
    }

    /// Replace the suite reporter
    pub fn with_reporter(mut self, reporter: impl SuiteReporter + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Benchmark reporter for benchmarks without their own
    pub fn with_benchmark_reporter(mut self, reporter: impl BenchmarkReporter + 'static) -> Self {
        self.benchmark_reporter = Some(Arc::new(reporter));
        self
    }

    /// Measures for benchmarks without their own
    pub fn with_measures<M: Into<SharedMeasure>>(
        mut self,
        measures: impl IntoIterator<Item = M>,
    ) -> Self {
        let measures: Vec<SharedMeasure> = measures.into_iter().map(Into::into).collect();
        self.measures = (!measures.is_empty()).then_some(measures);
        self
    }

    /// Suite failure handling; with `propagate`, every benchmark uses it too
    pub fn with_error_strategy(mut self, strategy: ErrorStrategy, propagate: bool) -> Self {
        self.error_strategy = Some(strategy);
        self.propagate_error_strategy = propagate;
        self
    }

    /// Run every benchmark in order
    pub async fn run(&self) -> Result<SuiteResults, BenchError> {
        self.reporter.set_total_benchmarks(self.benchmarks.len());
        self.reporter.on_suite_start(&self.name);

        let mut results = SuiteResults::new();
        for benchmark in &self.benchmarks {
            self.reporter.on_benchmark_start(benchmark.name());
            let benchmark = self.prepare(benchmark.clone());
            let benchmark_results = benchmark.run().await?;
            self.reporter
                .on_benchmark_end(benchmark.name(), &benchmark_results);
            results.insert(benchmark.name(), benchmark_results);
        }

        self.reporter.report(&results);

        if self.error_strategy == Some(ErrorStrategy::DelayedThrow) && results.failed_count() > 0 {
            return Err(BenchError::AggregateSuite { results });
        }
        Ok(results)
    }

    fn prepare(&self, mut benchmark: Benchmark) -> Benchmark {
        benchmark = benchmark.with_variations(self.variations.iter().cloned());
        if benchmark.measures().is_none() {
            if let Some(measures) = &self.measures {
                benchmark = benchmark.with_measures(measures.iter().cloned());
            }
        }
        if !benchmark.has_reporter() {
            if let Some(reporter) = &self.benchmark_reporter {
                benchmark = benchmark.with_shared_reporter(Arc::clone(reporter));
            }
        }
        if self.propagate_error_strategy {
            if let Some(strategy) = self.error_strategy {
                benchmark = benchmark.with_error_strategy(strategy);
            }
        }
        benchmark
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variations: Vec<&str> = self.variations.iter().map(|v| v.name()).collect();
        f.debug_struct("Suite")
            .field("name", &self.name)
            .field("benchmarks", &self.benchmarks)
            .field("variations", &variations)
            .field("measures", &self.measures)
            .field("error_strategy", &self.error_strategy)
            .field("propagate_error_strategy", &self.propagate_error_strategy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::MemoryMeasure;
    use crate::reporter::NoopReporter;
    use anyhow::anyhow;
    use parking_lot::Mutex;

    fn ok_benchmark(name: &str) -> Benchmark {
        Benchmark::new(name)
            .with_iterations(2)
            .with_action(|_| async { Ok(()) })
    }

    #[derive(Clone, Default)]
    struct Events(Arc<Mutex<Vec<String>>>);

    impl SuiteReporter for Events {
        fn on_suite_start(&self, name: &str) {
            self.0.lock().push(format!("suite:{name}"));
        }

        fn set_total_benchmarks(&self, count: usize) {
            self.0.lock().push(format!("total:{count}"));
        }

        fn on_benchmark_start(&self, name: &str) {
            self.0.lock().push(format!("start:{name}"));
        }

        fn on_benchmark_end(&self, name: &str, results: &[BenchmarkResult]) {
            self.0.lock().push(format!("end:{name}:{}", results.len()));
        }

        fn report(&self, results: &SuiteResults) {
            self.0.lock().push(format!("report:{}", results.len()));
        }
    }

    #[tokio::test]
    async fn test_suite_variations_apply_to_every_benchmark() {
        let suite = Suite::new("s")
            .add_benchmark(ok_benchmark("foo"))
            .add_benchmark(ok_benchmark("bar").with_variation(Variation::new("own")))
            .with_variations([Variation::new("baz"), Variation::new("bam")])
            .with_benchmark_reporter(NoopReporter)
            .with_reporter(NoopReporter);

        let results = suite.run().await.unwrap();
        assert_eq!(results.names().collect::<Vec<_>>(), vec!["foo", "bar"]);

        let labels = |name: &str| -> Vec<String> {
            results.get(name).unwrap().iter().map(|r| r.label.clone()).collect()
        };
        assert_eq!(labels("foo"), vec!["baz", "bam"]);
        assert_eq!(labels("bar"), vec!["own", "baz", "bam"]);
        assert_eq!(results.result_count(), 5);
    }

    #[tokio::test]
    async fn test_reporter_events_in_order() {
        let events = Events::default();
        Suite::new("s")
            .add_benchmark(ok_benchmark("a"))
            .add_benchmark(ok_benchmark("b"))
            .with_benchmark_reporter(NoopReporter)
            .with_reporter(events.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(
            *events.0.lock(),
            vec!["total:2", "suite:s", "start:a", "end:a:1", "start:b", "end:b:1", "report:2"]
        );
    }

    #[tokio::test]
    async fn test_measures_only_fill_unset() {
        let results = Suite::new("s")
            .add_benchmark(ok_benchmark("plain"))
            .add_benchmark(ok_benchmark("own").with_measure(MemoryMeasure::allocations()))
            .with_measures([crate::measure::custom("fixed", None, || (), |_: ()| 1.0)])
            .with_benchmark_reporter(NoopReporter)
            .with_reporter(NoopReporter)
            .run()
            .await
            .unwrap();

        assert_eq!(results.get("plain").unwrap()[0].average, 1.0);
        assert_eq!(results.get("own").unwrap()[0].kind, None);
        assert!(results.get("own").unwrap()[0].average >= 0.0);
    }

    #[tokio::test]
    async fn test_delayed_throw_after_report() {
        let events = Events::default();
        let err = Suite::new("s")
            .add_benchmark(ok_benchmark("ok"))
            .add_benchmark(
                Benchmark::new("bad")
                    .with_iterations(2)
                    .with_action(|_| async { Err::<(), _>(anyhow!("x")) }),
            )
            .with_error_strategy(ErrorStrategy::DelayedThrow, false)
            .with_benchmark_reporter(NoopReporter)
            .with_reporter(events.clone())
            .run()
            .await
            .unwrap_err();

        let BenchError::AggregateSuite { results } = &err else {
            panic!("expected aggregate suite error");
        };
        assert_eq!(results.len(), 2);
        assert_eq!(results.failed_count(), 1);
        assert_eq!(err.to_string(), "1 of 2 results failed across 2 benchmarks");
        assert_eq!(events.0.lock().last().map(String::as_str), Some("report:2"));
    }

    #[tokio::test]
    async fn test_propagated_abort_stops_suite() {
        let err = Suite::new("s")
            .add_benchmark(
                Benchmark::new("bad")
                    .with_iterations(3)
                    .with_action(|_| async { Err::<(), _>(anyhow!("x")) }),
            )
            .add_benchmark(ok_benchmark("never"))
            .with_error_strategy(ErrorStrategy::Abort, true)
            .with_reporter(NoopReporter)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::Action { .. }));
    }

    #[test]
    fn test_results_insert_and_serialize() {
        let mut results = SuiteResults::new();
        results.insert("b", Vec::new());
        results.insert("a", Vec::new());
        results.insert("b", Vec::new());

        assert_eq!(results.names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(serde_json::to_string(&results).unwrap(), r#"{"b":[],"a":[]}"#);
        assert!(results.get("c").is_none());
    }
}
