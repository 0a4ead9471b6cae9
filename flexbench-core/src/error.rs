//! Errors and Error Strategies

use crate::suite::SuiteResults;
use flexbench_stats::{BenchmarkResult, Failure};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// What a benchmark does when an iteration's action fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorStrategy {
    /// Record the failure as the iteration's sample and keep going
    #[default]
    Continue,
    /// Fail the whole run on the first failed iteration
    Abort,
    /// Keep going, then fail the run after reporting if any result failed
    DelayedThrow,
}

/// Lifecycle hook phase, used in error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    /// Once per variation, before warmup
    Setup,
    /// Before every iteration
    SetupEach,
    /// After every iteration
    TeardownEach,
    /// Once per variation, after the last iteration
    Teardown,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookPhase::Setup => "setup",
            HookPhase::SetupEach => "setup_each",
            HookPhase::TeardownEach => "teardown_each",
            HookPhase::Teardown => "teardown",
        })
    }
}

/// Errors returned by benchmark and suite runs
#[derive(Debug, Clone, Error)]
pub enum BenchError {
    /// Neither the benchmark nor any variation has an action
    #[error("Benchmark {benchmark} is missing an action")]
    MissingAction {
        /// Benchmark name
        benchmark: String,
    },

    /// Some variations have no action and the benchmark has none to share
    #[error("Missing action for variations: {}", .variations.join(", "))]
    MissingVariationActions {
        /// Benchmark name
        benchmark: String,
        /// Variations without an action
        variations: Vec<String>,
    },

    /// CLI args were given for a callback action
    #[error("Cannot use CLI args with a non-command action for {benchmark}:{variation}")]
    CliArgsWithoutCommand {
        /// Benchmark name
        benchmark: String,
        /// Variation name
        variation: String,
    },

    /// A lifecycle hook failed
    #[error("{phase} hook failed for {benchmark}:{variation}: {source}")]
    Hook {
        /// Failing phase
        phase: HookPhase,
        /// Benchmark name
        benchmark: String,
        /// Variation name
        variation: String,
        /// Error returned by the hook
        source: Failure,
    },

    /// A warmup iteration failed; fatal under every strategy
    #[error("Warmup failed for {benchmark}:{variation}: {source}")]
    Warmup {
        /// Benchmark name
        benchmark: String,
        /// Variation name
        variation: String,
        /// Error returned by the action
        source: Failure,
    },

    /// An iteration failed under [`ErrorStrategy::Abort`]
    #[error("Iteration failed for {benchmark}:{variation}: {source}")]
    Action {
        /// Benchmark name
        benchmark: String,
        /// Variation name
        variation: String,
        /// Error returned by the action
        source: Failure,
    },

    /// The timeout elapsed before the iteration target was reached
    #[error("Timeout: {benchmark}:{variation} completed {completed} of {target} iterations")]
    Timeout {
        /// Benchmark name
        benchmark: String,
        /// Variation name
        variation: String,
        /// Iterations finished before the deadline
        completed: usize,
        /// Configured iteration count
        target: usize,
    },

    /// Failed results of a benchmark under [`ErrorStrategy::DelayedThrow`]
    #[error("{} of {} results failed", failed_count(.results), .results.len())]
    AggregateBenchmark {
        /// Every result, failed or not
        results: Vec<BenchmarkResult>,
    },

    /// Failed results of a suite under [`ErrorStrategy::DelayedThrow`]
    #[error(
        "{} of {} results failed across {} benchmarks",
        .results.failed_count(),
        .results.result_count(),
        .results.len()
    )]
    AggregateSuite {
        /// Results of every benchmark that ran
        results: SuiteResults,
    },

    /// A declaration body panicked before producing its benchmark or suite
    #[error("Declaration failed: {0}")]
    Declaration(String),
}

fn failed_count<'a>(results: impl IntoIterator<Item = &'a BenchmarkResult>) -> usize {
    results.into_iter().filter(|r| r.failed).count()
}

impl BenchError {
    /// The failure behind a hook, warmup or aborted iteration
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            BenchError::Hook { source, .. }
            | BenchError::Warmup { source, .. }
            | BenchError::Action { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether the run was rejected before any iteration executed
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BenchError::MissingAction { .. }
                | BenchError::MissingVariationActions { .. }
                | BenchError::CliArgsWithoutCommand { .. }
        )
    }
}
