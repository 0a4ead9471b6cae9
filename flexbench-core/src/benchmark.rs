//! Benchmark - The Per-Variation State Machine
//!
//! [`Benchmark::run`] validates once, then runs every variation in order:
//!
//! 1. overlay the variation's environment and run the setup hooks
//! 2. run the unmeasured warmup iterations
//! 3. run measured iterations until the iteration target is met or the
//!    timeout elapses
//! 4. run the teardown hooks and restore the environment
//! 5. compute the primary result, with secondary measures and watched spans
//!    as subresults
//!
//! Variations never run concurrently. The reporter sees the results before a
//! delayed-throw error is returned.

use crate::action::Action;
use crate::blackhole::Consumable;
use crate::environment::EnvironmentScope;
use crate::error::{BenchError, ErrorStrategy, HookPhase};
use crate::hooks::{Hook, Hooks, Lifecycle};
use crate::measure::{DurationMeasure, PendingSample, SharedMeasure};
use crate::performance::{PerformanceObserverOptions, PerformanceWatcher};
use crate::reporter::{BenchmarkReporter, ProgressContext, TracingReporter};
use crate::timer::Timer;
use crate::variation::Variation;
use flexbench_stats::{BenchmarkResult, Failure, MeasureKind, ResultMeta, Sample, compute_result};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Iterations used when neither an iteration count nor a timeout is set
pub const DEFAULT_ITERATIONS: usize = 5;

/// Values applied to every benchmark that leaves them unset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BenchmarkDefaults {
    /// Measured iterations per variation
    pub iterations: Option<usize>,
    /// Unmeasured iterations per variation
    pub warmup_iterations: Option<usize>,
    /// Time bound for each variation's measured loop
    pub timeout: Option<Duration>,
    /// Failure handling
    pub error_strategy: Option<ErrorStrategy>,
}

/// A named unit of work measured across variations
#[derive(Clone)]
pub struct Benchmark {
    name: String,
    variations: Vec<Arc<Variation>>,
    hooks: Hooks,
    action: Option<Action>,
    iterations: Option<usize>,
    warmup_iterations: Option<usize>,
    timeout: Option<Duration>,
    error_strategy: Option<ErrorStrategy>,
    measures: Option<Vec<SharedMeasure>>,
    reporter: Option<Arc<dyn BenchmarkReporter>>,
    watcher: Option<PerformanceObserverOptions>,
}

impl Benchmark {
    /// Benchmark with no action, variations or limits
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variations: Vec::new(),
            hooks: Hooks::default(),
            action: None,
            iterations: None,
            warmup_iterations: None,
            timeout: None,
            error_strategy: None,
            measures: None,
            reporter: None,
            watcher: None,
        }
    }

    /// Benchmark name; suite results are keyed by it
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared variations
    pub fn variations(&self) -> &[Arc<Variation>] {
        &self.variations
    }

    /// Shared action
    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }

    /// Measured iterations per variation
    pub fn iterations(&self) -> Option<usize> {
        self.iterations
    }

    /// Unmeasured iterations per variation
    pub fn warmup_iterations(&self) -> Option<usize> {
        self.warmup_iterations
    }

    /// Time bound for each variation's measured loop
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Failure handling
    pub fn error_strategy(&self) -> Option<ErrorStrategy> {
        self.error_strategy
    }

    /// Configured measures; [`DurationMeasure`] is used when unset
    pub fn measures(&self) -> Option<&[SharedMeasure]> {
        self.measures.as_deref()
    }

    /// Whether a reporter was set explicitly
    pub fn has_reporter(&self) -> bool {
        self.reporter.is_some()
    }

    // ─── Builders ────────────────────────────────────────────────────────

    /// Append a variation
    pub fn with_variation(mut self, variation: impl Into<Arc<Variation>>) -> Self {
        self.variations.push(variation.into());
        self
    }

    /// Append variations
    pub fn with_variations<V: Into<Arc<Variation>>>(
        mut self,
        variations: impl IntoIterator<Item = V>,
    ) -> Self {
        self.variations.extend(variations.into_iter().map(Into::into));
        self
    }

    /// Shared async action. Its `Ok` value is consumed by the blackhole.
    pub fn with_action<F, Fut, T>(mut self, f: F) -> Self
    where
        F: Fn(Arc<Variation>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Consumable + Send + 'static,
    {
        self.action = Some(Action::callback(f));
        self
    }

    /// Shared shell-command action
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.action = Some(Action::command(command));
        self
    }

    /// Shared action
    pub fn with_action_value(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Measured iterations per variation. Zero means unset.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = Some(iterations);
        self
    }

    /// Unmeasured iterations per variation
    pub fn with_warmup_iterations(mut self, iterations: usize) -> Self {
        self.warmup_iterations = Some(iterations);
        self
    }

    /// Bound each variation's measured loop
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Failure handling
    pub fn with_error_strategy(mut self, strategy: ErrorStrategy) -> Self {
        self.error_strategy = Some(strategy);
        self
    }

    /// Append a measure; the first one added is primary
    pub fn with_measure(mut self, measure: impl Into<SharedMeasure>) -> Self {
        self.measures
            .get_or_insert_with(Vec::new)
            .push(measure.into());
        self
    }

    /// Append measures
    pub fn with_measures<M: Into<SharedMeasure>>(
        mut self,
        measures: impl IntoIterator<Item = M>,
    ) -> Self {
        for measure in measures {
            self = self.with_measure(measure);
        }
        self
    }

    /// Send progress and results to `reporter` instead of the log
    pub fn with_reporter(mut self, reporter: impl BenchmarkReporter + 'static) -> Self {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    /// Shared form of [`with_reporter`](Self::with_reporter)
    pub fn with_shared_reporter(mut self, reporter: Arc<dyn BenchmarkReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Collect [`performance`](crate::performance) spans as subresults
    pub fn with_performance_observer(mut self, options: PerformanceObserverOptions) -> Self {
        self.watcher = Some(options);
        self
    }

    /// Fill every unset limit from `defaults`
    pub fn with_defaults(mut self, defaults: &BenchmarkDefaults) -> Self {
        self.iterations = self.iterations.or(defaults.iterations);
        self.warmup_iterations = self.warmup_iterations.or(defaults.warmup_iterations);
        self.timeout = self.timeout.or(defaults.timeout);
        self.error_strategy = self.error_strategy.or(defaults.error_strategy);
        self
    }

    // ─── Run ─────────────────────────────────────────────────────────────

    /// Run every variation and return one result per variation, in order.
    pub async fn run(&self) -> Result<Vec<BenchmarkResult>, BenchError> {
        let plan = self.validate()?;
        let reporter: Arc<dyn BenchmarkReporter> = self
            .reporter
            .clone()
            .unwrap_or_else(|| Arc::new(TracingReporter));
        let watcher = self.watcher.clone().map(PerformanceWatcher::connect);

        tracing::debug!(
            benchmark = %self.name,
            variations = plan.variations.len(),
            iterations = ?plan.iterations,
            timeout_ms = ?self.timeout.map(|t| t.as_millis() as u64),
            "running benchmark"
        );

        let mut progress = Progress {
            started: Instant::now(),
            total_iterations: plan.iterations.map(|n| n * plan.variations.len()),
            completed_iterations: 0,
            timeout: self.timeout,
        };

        let mut results = Vec::with_capacity(plan.variations.len());
        for (index, (variation, action)) in plan.variations.iter().enumerate() {
            let mut result = self
                .run_variation(variation, action, plan.iterations, reporter.as_ref(), &mut progress)
                .await?;

            if let Some(watcher) = &watcher {
                for (name, durations) in watcher.measures().await {
                    let samples: Vec<Sample> = durations.into_iter().map(Sample::Value).collect();
                    let meta = ResultMeta {
                        kind: Some(MeasureKind::Time),
                        iterations: Some(samples.len()),
                        total_duration: None,
                        benchmark_name: Some(self.name.clone()),
                        variation_name: Some(variation.name().to_string()),
                    };
                    result.subresults.push(compute_result(name, samples, meta));
                }
                watcher.clear();
            }

            if progress.total_iterations.is_none() {
                let fraction = (index + 1) as f64 / plan.variations.len() as f64;
                reporter.progress(variation.name(), fraction, &progress.context());
            }
            results.push(result);
        }

        if let Some(watcher) = watcher {
            watcher.disconnect();
        }

        reporter.report(self, &results);

        if self.error_strategy == Some(ErrorStrategy::DelayedThrow) && results.iter().any(|r| r.failed) {
            return Err(BenchError::AggregateBenchmark { results });
        }
        Ok(results)
    }

    fn validate(&self) -> Result<Plan, BenchError> {
        let iterations = match self.iterations.filter(|&n| n > 0) {
            Some(n) => Some(n),
            None if self.timeout.is_none() => Some(DEFAULT_ITERATIONS),
            None => None,
        };

        let variations: Vec<Arc<Variation>> = if self.variations.is_empty() {
            vec![Arc::new(Variation::new("default"))]
        } else {
            self.variations.clone()
        };

        let mut resolved = Vec::with_capacity(variations.len());
        let mut missing = Vec::new();
        for variation in variations {
            match variation.action().or(self.action.as_ref()).cloned() {
                Some(action) => {
                    if !action.is_command() && !variation.cli_args().is_empty() {
                        return Err(BenchError::CliArgsWithoutCommand {
                            benchmark: self.name.clone(),
                            variation: variation.name().to_string(),
                        });
                    }
                    resolved.push((variation, action));
                }
                None => missing.push(variation.name().to_string()),
            }
        }

        if !missing.is_empty() {
            if resolved.is_empty() {
                return Err(BenchError::MissingAction {
                    benchmark: self.name.clone(),
                });
            }
            return Err(BenchError::MissingVariationActions {
                benchmark: self.name.clone(),
                variations: missing,
            });
        }

        Ok(Plan {
            iterations,
            variations: resolved,
        })
    }

    fn timed_out(&self, variation: &Variation, completed: usize, target: usize) -> BenchError {
        BenchError::Timeout {
            benchmark: self.name.clone(),
            variation: variation.name().to_string(),
            completed,
            target,
        }
    }

    async fn run_variation(
        &self,
        variation: &Arc<Variation>,
        action: &Action,
        iterations: Option<usize>,
        reporter: &dyn BenchmarkReporter,
        progress: &mut Progress,
    ) -> Result<BenchmarkResult, BenchError> {
        let scope = EnvironmentScope::enter(variation.environment()).await;
        let timer = Timer::start();
        let hooks = variation.hooks();

        self.run_hooks(HookPhase::Setup, [&self.hooks.setup, &hooks.setup], variation)
            .await?;

        let warmup = variation
            .warmup_iterations()
            .or(self.warmup_iterations)
            .unwrap_or(0);
        tracing::debug!(benchmark = %self.name, variation = %variation.name(), warmup, "warming up");
        for _ in 0..warmup {
            self.run_hooks(
                HookPhase::SetupEach,
                [&self.hooks.setup_each, &hooks.setup_each],
                variation,
            )
            .await?;
            action.run(variation).await.map_err(|source| BenchError::Warmup {
                benchmark: self.name.clone(),
                variation: variation.name().to_string(),
                source,
            })?;
            self.run_hooks(
                HookPhase::TeardownEach,
                [&self.hooks.teardown_each, &hooks.teardown_each],
                variation,
            )
            .await?;
        }

        let default_measures = [SharedMeasure::from(DurationMeasure)];
        let measures: &[SharedMeasure] = variation
            .measures()
            .or(self.measures.as_deref())
            .unwrap_or(&default_measures);
        let strategy = variation
            .error_strategy()
            .or(self.error_strategy)
            .unwrap_or_default();
        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        tracing::debug!(benchmark = %self.name, variation = %variation.name(), "measuring");

        let mut samples: Vec<Vec<Sample>> = vec![Vec::new(); measures.len()];
        let mut completed = 0;
        loop {
            if iterations.is_some_and(|target| completed >= target) {
                break;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                if let Some(target) = iterations {
                    return Err(self.timed_out(variation, completed, target));
                }
                break;
            }

            self.run_hooks(
                HookPhase::SetupEach,
                [&self.hooks.setup_each, &hooks.setup_each],
                variation,
            )
            .await?;

            // Started in reverse so the primary measure brackets the action most tightly
            let mut pending: Vec<PendingSample> = measures.iter().rev().map(SharedMeasure::start).collect();
            let outcome = action.run(variation).await;
            pending.reverse();
            let iteration: Vec<Sample> = match outcome {
                Ok(()) => pending.into_iter().map(|p| Sample::Value(p.end())).collect(),
                Err(failure) => {
                    drop(pending);
                    vec![Sample::Failed(failure); measures.len()]
                }
            };

            if let Some(failure) = iteration.first().and_then(Sample::failure) {
                if strategy == ErrorStrategy::Abort {
                    return Err(BenchError::Action {
                        benchmark: self.name.clone(),
                        variation: variation.name().to_string(),
                        source: failure.clone(),
                    });
                }
                tracing::warn!(
                    benchmark = %self.name,
                    variation = %variation.name(),
                    iteration = completed,
                    error = %failure,
                    "iteration failed"
                );
            }

            self.run_hooks(
                HookPhase::TeardownEach,
                [&self.hooks.teardown_each, &hooks.teardown_each],
                variation,
            )
            .await?;

            // The deadline passing mid-iteration fails the run even if this
            // iteration would have met the target
            if let (Some(deadline), Some(target)) = (deadline, iterations) {
                if Instant::now() > deadline {
                    return Err(self.timed_out(variation, completed, target));
                }
            }

            for (accumulator, sample) in samples.iter_mut().zip(iteration) {
                accumulator.push(sample);
            }
            completed += 1;
            progress.completed_iterations += 1;
            tracing::trace!(variation = %variation.name(), iteration = completed, "iteration done");

            if let Some(total) = progress.total_iterations {
                let fraction = progress.completed_iterations as f64 / total as f64;
                reporter.progress(variation.name(), fraction, &progress.context());
            }
        }

        self.run_hooks(HookPhase::Teardown, [&hooks.teardown, &self.hooks.teardown], variation)
            .await?;
        let total_duration = timer.elapsed_ms();
        drop(scope);

        let mut results = measures.iter().zip(samples).map(|(measure, samples)| {
            let meta = ResultMeta {
                kind: measure.kind(),
                iterations: Some(samples.len()),
                total_duration: Some(total_duration),
                benchmark_name: Some(self.name.clone()),
                variation_name: Some(variation.name().to_string()),
            };
            (measure, samples, meta)
        });

        let Some((_, samples, meta)) = results.next() else {
            return Ok(compute_result(variation.name(), Vec::new(), ResultMeta::default()));
        };
        let mut result = compute_result(variation.name(), samples, meta);
        result.subresults = results
            .map(|(measure, samples, meta)| compute_result(measure.label(), samples, meta))
            .collect();
        Ok(result)
    }

    async fn run_hooks(
        &self,
        phase: HookPhase,
        lists: [&Vec<Hook>; 2],
        variation: &Arc<Variation>,
    ) -> Result<(), BenchError> {
        for hook in lists.into_iter().flatten() {
            hook(Arc::clone(variation))
                .await
                .map_err(|error| BenchError::Hook {
                    phase,
                    benchmark: self.name.clone(),
                    variation: variation.name().to_string(),
                    source: Failure::from(error),
                })?;
        }
        Ok(())
    }
}

impl Lifecycle for Benchmark {
    fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    fn hooks_mut(&mut self) -> &mut Hooks {
        &mut self.hooks
    }
}

impl fmt::Debug for Benchmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variations: Vec<&str> = self.variations.iter().map(|v| v.name()).collect();
        f.debug_struct("Benchmark")
            .field("name", &self.name)
            .field("variations", &variations)
            .field("hooks", &self.hooks)
            .field("action", &self.action)
            .field("iterations", &self.iterations)
            .field("warmup_iterations", &self.warmup_iterations)
            .field("timeout", &self.timeout)
            .field("error_strategy", &self.error_strategy)
            .field("measures", &self.measures)
            .finish_non_exhaustive()
    }
}

/// Validated run: resolved iteration target and one action per variation
struct Plan {
    iterations: Option<usize>,
    variations: Vec<(Arc<Variation>, Action)>,
}

struct Progress {
    started: Instant,
    total_iterations: Option<usize>,
    completed_iterations: usize,
    timeout: Option<Duration>,
}

impl Progress {
    fn context(&self) -> ProgressContext {
        ProgressContext {
            total_iterations: self.total_iterations,
            completed_iterations: self.completed_iterations,
            timeout: self.timeout,
            time_elapsed: self.started.elapsed(),
        }
    }
}
