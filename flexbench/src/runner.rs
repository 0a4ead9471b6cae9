//! Declarative Registration
//!
//! `suite`, `benchmark` and `variation` build the core types from closures,
//! and the free functions (`setup`, `measure`, ...) attach to whichever
//! declaration is running:
//!
//! ```no_run
//! use flexbench::prelude::*;
//!
//! # async fn demo() -> Result<(), BenchError> {
//! let results = suite("parsing", |s| async move {
//!     measure(DurationMeasure);
//!     benchmark("json", |b| async move {
//!         setup(|_| async { Ok(()) });
//!         b.with_iterations(10).with_action(|_| async { Ok(42u64) })
//!     });
//!     s
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! The active declaration is tracked per task, so bodies pending at the same
//! time never see each other's state. A benchmark declared inside a suite is
//! attached to that suite at call time and registered in declaration order.
//! Standalone benchmarks run one after another in declaration order.

use crate::lazy::Lazy;
use flexbench_core::{
    BenchError, Benchmark, BenchmarkDefaults, BenchmarkResult, Hook, Hooks, Lifecycle,
    SharedMeasure, Suite, SuiteResults, Variation, hook,
};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::future::{Future, IntoFuture};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

type Registration = Shared<BoxFuture<'static, Result<Benchmark, BenchError>>>;

#[derive(Default)]
struct SuiteCollector {
    variations: Vec<Variation>,
    measures: Vec<SharedMeasure>,
    registrations: Vec<Registration>,
}

#[derive(Default)]
struct BenchmarkCollector {
    hooks: Hooks,
    variations: Vec<Variation>,
    measures: Vec<SharedMeasure>,
}

impl BenchmarkCollector {
    fn apply(self, benchmark: Benchmark) -> Benchmark {
        benchmark
            .with_hooks(self.hooks)
            .with_variations(self.variations)
            .with_measures(self.measures)
    }
}

#[derive(Clone, Default)]
struct Scope {
    suite: Option<Arc<Mutex<SuiteCollector>>>,
    benchmark: Option<Arc<Mutex<BenchmarkCollector>>>,
    variation: Option<Arc<Mutex<Hooks>>>,
}

tokio::task_local! {
    static ACTIVE: Scope;
}

fn current() -> Scope {
    ACTIVE.try_with(Scope::clone).unwrap_or_default()
}

static DEFAULTS: RwLock<BenchmarkDefaults> = parking_lot::const_rwlock(BenchmarkDefaults {
    iterations: None,
    warmup_iterations: None,
    timeout: None,
    error_strategy: None,
});

// Completion of the most recently declared standalone benchmark
static STANDALONE_TAIL: Mutex<Option<Shared<BoxFuture<'static, ()>>>> =
    parking_lot::const_mutex(None);

/// Install defaults for every benchmark declared from now on
pub fn configure(defaults: BenchmarkDefaults) {
    *DEFAULTS.write() = defaults;
}

/// Defaults currently applied to declared benchmarks
pub fn defaults() -> BenchmarkDefaults {
    DEFAULTS.read().clone()
}

/// Run `start` and the future it returns with `scope` active. A panic becomes
/// [`BenchError::Declaration`].
async fn enter<Start, Fut, T>(scope: Scope, start: Start) -> Result<T, BenchError>
where
    Start: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    AssertUnwindSafe(async {
        let future = ACTIVE.sync_scope(scope.clone(), start);
        ACTIVE.scope(scope, future).await
    })
    .catch_unwind()
    .await
    .map_err(|payload| BenchError::Declaration(panic_message(payload.as_ref())))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "declaration panicked".to_string()
    }
}

// ─── Declarations ────────────────────────────────────────────────────────

/// Declare a suite. The body receives a fresh [`Suite`] and returns the one
/// to run; benchmarks, variations and measures declared inside it are added.
///
/// The returned handle runs the suite on first await.
pub fn suite<F, Fut>(name: impl Into<String>, body: F) -> Lazy<SuiteResults>
where
    F: FnOnce(Suite) -> Fut + Send + 'static,
    Fut: Future<Output = Suite> + Send + 'static,
{
    let name = name.into();
    Lazy::new(async move {
        let collector = Arc::new(Mutex::new(SuiteCollector::default()));
        let scope = Scope {
            suite: Some(Arc::clone(&collector)),
            ..Scope::default()
        };
        let mut suite = enter(scope, move || body(Suite::new(name))).await?;

        let mut index = 0;
        loop {
            let next = collector.lock().registrations.get(index).cloned();
            let Some(registration) = next else { break };
            suite.push_benchmark(registration.await?);
            index += 1;
        }

        let (variations, measures) = {
            let mut collector = collector.lock();
            (
                std::mem::take(&mut collector.variations),
                std::mem::take(&mut collector.measures),
            )
        };
        let mut suite = suite.with_variations(variations);
        if !measures.is_empty() {
            suite = suite.with_measures(measures);
        }

        tracing::debug!(suite = %suite.name(), benchmarks = suite.benchmarks().len(), "suite declared");
        suite.run().await
    })
    .track()
}

/// Declare a benchmark. The body receives a fresh [`Benchmark`] and returns
/// the one to run.
///
/// Inside a suite the handle resolves to an empty list once the benchmark is
/// registered; the suite runs it. Outside a suite the handle runs the
/// benchmark after every previously declared standalone benchmark.
pub fn benchmark<F, Fut>(name: impl Into<String>, body: F) -> Lazy<Vec<BenchmarkResult>>
where
    F: FnOnce(Benchmark) -> Fut + Send + 'static,
    Fut: Future<Output = Benchmark> + Send + 'static,
{
    let name = name.into();
    let scope = current();

    if let Some(suite) = scope.suite {
        let registration: Registration = declare_benchmark(name, body, Some(Arc::clone(&suite)))
            .boxed()
            .shared();
        suite.lock().registrations.push(registration.clone());
        return Lazy::new(async move { registration.await.map(|_| Vec::new()) });
    }

    let mut tail = STANDALONE_TAIL.lock();
    let previous = tail.take();
    let lazy = Lazy::new(async move {
        let benchmark = declare_benchmark(name, body, None).await?;
        if let Some(previous) = previous {
            previous.await;
        }
        benchmark.run().await
    })
    .track();
    *tail = Some(lazy.clone().into_future().map(|_| ()).boxed().shared());
    lazy
}

async fn declare_benchmark<F, Fut>(
    name: String,
    body: F,
    suite: Option<Arc<Mutex<SuiteCollector>>>,
) -> Result<Benchmark, BenchError>
where
    F: FnOnce(Benchmark) -> Fut + Send + 'static,
    Fut: Future<Output = Benchmark> + Send + 'static,
{
    let collector = Arc::new(Mutex::new(BenchmarkCollector::default()));
    let scope = Scope {
        suite,
        benchmark: Some(Arc::clone(&collector)),
        variation: None,
    };
    let benchmark = enter(scope, move || body(Benchmark::new(name))).await?;
    let collected = std::mem::take(&mut *collector.lock());
    Ok(collected.apply(benchmark).with_defaults(&defaults()))
}

/// Declare a variation of the running benchmark, or of every benchmark in
/// the running suite.
///
/// # Panics
///
/// Outside a benchmark or suite body.
pub fn variation<F>(name: impl Into<String>, body: F)
where
    F: FnOnce(Variation) -> Variation,
{
    let scope = current();
    if scope.benchmark.is_none() && scope.suite.is_none() {
        panic!("`variation` must be called within a benchmark or suite");
    }

    let hooks = Arc::new(Mutex::new(Hooks::default()));
    let inner = Scope {
        variation: Some(Arc::clone(&hooks)),
        ..scope.clone()
    };
    let declared = ACTIVE.sync_scope(inner, || body(Variation::new(name)));
    let declared = declared.with_hooks(std::mem::take(&mut *hooks.lock()));

    if let Some(benchmark) = &scope.benchmark {
        benchmark.lock().variations.push(declared);
    } else if let Some(suite) = &scope.suite {
        suite.lock().variations.push(declared);
    }
}

/// Add a measure to the running benchmark, or to every benchmark in the
/// running suite that sets none. Call repeatedly for several; the first is
/// primary.
///
/// # Panics
///
/// Outside a benchmark or suite body.
pub fn measure(measure: impl Into<SharedMeasure>) {
    let scope = current();
    if let Some(benchmark) = &scope.benchmark {
        benchmark.lock().measures.push(measure.into());
    } else if let Some(suite) = &scope.suite {
        suite.lock().measures.push(measure.into());
    } else {
        panic!("`measure` must be called within a benchmark or suite");
    }
}

fn attach(name: &str, hook: Hook, list: fn(&mut Hooks) -> &mut Vec<Hook>) {
    let scope = current();
    if let Some(variation) = &scope.variation {
        list(&mut *variation.lock()).push(hook);
    } else if let Some(benchmark) = &scope.benchmark {
        list(&mut benchmark.lock().hooks).push(hook);
    } else {
        panic!("`{name}` must be called within a variation or benchmark");
    }
}

/// Run once per variation before warmup
///
/// # Panics
///
/// Outside a variation or benchmark body.
pub fn setup<F, Fut>(f: F)
where
    F: Fn(Arc<Variation>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    attach("setup", hook(f), |hooks| &mut hooks.setup);
}

/// Run before every iteration
///
/// # Panics
///
/// Outside a variation or benchmark body.
pub fn setup_each<F, Fut>(f: F)
where
    F: Fn(Arc<Variation>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    attach("setup_each", hook(f), |hooks| &mut hooks.setup_each);
}

/// Run once per variation after the last iteration
///
/// # Panics
///
/// Outside a variation or benchmark body.
pub fn teardown<F, Fut>(f: F)
where
    F: Fn(Arc<Variation>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    attach("teardown", hook(f), |hooks| &mut hooks.teardown);
}

/// Run after every iteration
///
/// # Panics
///
/// Outside a variation or benchmark body.
pub fn teardown_each<F, Fut>(f: F)
where
    F: Fn(Arc<Variation>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    attach("teardown_each", hook(f), |hooks| &mut hooks.teardown_each);
}

// ─── Disabled forms ──────────────────────────────────────────────────────

/// Disabled [`suite`]: the body never runs and the handle resolves to no results
pub fn xsuite<F, Fut>(_name: impl Into<String>, _body: F) -> Lazy<SuiteResults>
where
    F: FnOnce(Suite) -> Fut + Send + 'static,
    Fut: Future<Output = Suite> + Send + 'static,
{
    Lazy::ready(SuiteResults::default())
}

/// Disabled [`benchmark`]: the body never runs and the handle resolves to no results
pub fn xbenchmark<F, Fut>(_name: impl Into<String>, _body: F) -> Lazy<Vec<BenchmarkResult>>
where
    F: FnOnce(Benchmark) -> Fut + Send + 'static,
    Fut: Future<Output = Benchmark> + Send + 'static,
{
    Lazy::ready(Vec::new())
}

/// Disabled [`variation`]: the body never runs
pub fn xvariation<F>(_name: impl Into<String>, _body: F)
where
    F: FnOnce(Variation) -> Variation,
{
}
