#![warn(missing_docs)]
//! # FlexBench
//!
//! Async benchmarking harness: declare benchmarks over variations of
//! environment variables, CLI arguments or typed context, measure them with
//! pluggable measures, and report per-variation statistics.
//!
//! - **Variations**: Cartesian products of environment variables and CLI
//!   alternatives, or one variation per context value
//! - **Lifecycle hooks**: setup/teardown per variation and per iteration
//! - **Error strategies**: continue, abort, or fail after reporting
//! - **Measures**: wall-clock duration, hardware ticks, allocations, RSS, or
//!   your own
//! - **Environment isolation**: each variation's environment is overlaid and
//!   restored exactly
//!
//! ## Quick Start
//!
//! ```no_run
//! use flexbench::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), BenchError> {
//!     flexbench::init_logging(None);
//!
//!     let results = benchmark("sum", |b| async move {
//!         b.with_iterations(20)
//!             .with_variations(Variation::from_contexts("n", [("small", 1_000u64), ("large", 100_000u64)]))
//!             .with_action(|v| async move {
//!                 let n = v.get_or_default("n", 0u64);
//!                 Ok((0..n).sum::<u64>())
//!             })
//!     })
//!     .await?;
//!
//!     for result in &results {
//!         println!("{}: {:.3}ms", result.label, result.average);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Builders
//!
//! The declaration functions are sugar over [`Benchmark`] and [`Suite`],
//! which can be built and run directly:
//!
//! ```no_run
//! use flexbench::{Benchmark, ErrorStrategy, Variation};
//!
//! # async fn demo() -> Result<(), flexbench::BenchError> {
//! let results = Benchmark::new("build")
//!     .with_command("cargo build --offline")
//!     .with_variations(Variation::from_environment_variables([("CARGO_INCREMENTAL", ["0", "1"])]))
//!     .with_error_strategy(ErrorStrategy::Abort)
//!     .run()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use anyhow::Context;
use std::path::PathBuf;

mod config;
mod lazy;
mod logging;
mod runner;

pub use config::{CONFIG_FILE, Config, LoggingConfig, RunnerConfig, parse_duration};
pub use lazy::{Lazy, run_pending};
pub use logging::{DEFAULT_FILTER, init_logging};
pub use runner::{
    benchmark, configure, defaults, measure, setup, setup_each, suite, teardown, teardown_each,
    variation, xbenchmark, xsuite, xvariation,
};

// Aliases for readers coming from test frameworks
pub use runner::{
    benchmark as it, benchmark as test_case, setup as before_all, setup_each as before_each,
    suite as describe, teardown as after_all, teardown_each as after_each, xbenchmark as xit,
    xsuite as xdescribe,
};

// Re-export core types
pub use flexbench_core::{
    Action, AllocationStats, BenchError, Benchmark, BenchmarkDefaults, BenchmarkReporter,
    CliArg, CompositeReporter, CycleMeasure, DurationMeasure, EnvironmentScope, ErrorStrategy,
    HAS_CYCLE_COUNTER, HookPhase, Hooks, Lifecycle, Measure, MemoryMeasure, MemoryMetric,
    NoopReporter, PerformanceObserverOptions, PerformanceWatcher, ProgressContext,
    SharedMeasure, Suite, SuiteReporter, SuiteResults, Timer, TrackingAllocator,
    TracingReporter, Variation, allocation_stats, blackhole, format_value, measure as measures,
    performance,
};

// Re-export stats
pub use flexbench_stats::{
    BenchmarkResult, Failure, MeasureKind, ResultMeta, Sample, Summary, compute_result,
    nearest_rank, summarize,
};

/// Load `flexbench.toml` (if any), install its defaults and start logging.
///
/// Returns the configuration that was applied. A config file that exists but
/// cannot be read or validated is an error and nothing is installed.
pub fn init() -> anyhow::Result<Config> {
    init_from(std::env::current_dir()?)
}

fn init_from(dir: PathBuf) -> anyhow::Result<Config> {
    let config = match Config::locate_from(dir) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::default(),
    };
    let defaults = config
        .benchmark_defaults()
        .context("invalid [runner] configuration")?;
    init_logging(Some(&config.logging.filter));
    configure(defaults);
    Ok(config)
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BenchError, Benchmark, BenchmarkResult, CliArg, DurationMeasure, ErrorStrategy,
        Lifecycle, MemoryMeasure, Suite, SuiteResults, Variation, after_all, after_each,
        before_all, before_each, benchmark, describe, it, measure, run_pending, setup,
        setup_each, suite, teardown, teardown_each, test_case, variation, xbenchmark,
        xdescribe, xit, xsuite, xvariation,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_rejects_malformed_config() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join(CONFIG_FILE), "[runner\niterations = ").unwrap();
        let nested = root.path().join("nested");
        std::fs::create_dir_all(&nested).unwrap();

        let err = init_from(nested).unwrap_err();
        assert!(err.to_string().starts_with("failed to load"), "{err:#}");
    }

    #[test]
    fn test_init_rejects_invalid_runner_section() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join(CONFIG_FILE), "[runner]\ntimeout = \"soon\"\n").unwrap();

        let err = init_from(root.path().to_path_buf()).unwrap_err();
        assert_eq!(err.to_string(), "invalid [runner] configuration");
    }
}
