#![warn(missing_docs)]
//! FlexBench Core - Execution Engine
//!
//! This crate runs benchmarks:
//! - [`Benchmark`]: the per-variation state machine (setup, warmup, measured
//!   loop, teardown, aggregation)
//! - [`Suite`]: sequential runner keyed by benchmark name
//! - [`Variation`] factories for environment, CLI and context products
//! - Pluggable [`Measure`]s (duration, cycles, memory, custom)
//! - A [`blackhole`] sink that keeps benchmarked results alive
//! - Named [`performance`] spans collected as subresults

mod action;
mod allocator;
mod benchmark;
pub mod blackhole;
mod environment;
mod error;
mod hooks;
pub mod measure;
pub mod performance;
mod reporter;
mod suite;
mod timer;
mod variation;

pub use action::{Action, ActionFn};
pub use allocator::{AllocationStats, TrackingAllocator, allocation_stats, is_tracking};
pub use benchmark::{Benchmark, BenchmarkDefaults, DEFAULT_ITERATIONS};
pub use blackhole::{Blackhole, Consumable};
pub use environment::EnvironmentScope;
pub use error::{BenchError, ErrorStrategy, HookPhase};
pub use hooks::{Hook, Hooks, Lifecycle, hook};
pub use measure::{
    CycleMeasure, DurationMeasure, Measure, MemoryMeasure, MemoryMetric, PendingSample,
    SharedMeasure,
};
pub use performance::{PerformanceEntry, PerformanceObserverOptions, PerformanceWatcher};
pub use reporter::{
    BenchmarkReporter, CompositeReporter, NoopReporter, ProgressContext, SuiteReporter,
    TracingReporter, format_value,
};
pub use suite::{Suite, SuiteResults};
/// Whether this platform provides a hardware tick counter (x86_64 RDTSCP or
/// AArch64 CNTVCT_EL0). When `false`, `cpu:cycles` samples are always 0.
pub use timer::HAS_CYCLE_COUNTER;
pub use timer::{Timer, duration_ms};
pub use variation::{CliArg, Variation};

pub use flexbench_stats::{BenchmarkResult, Failure, MeasureKind, Sample};
