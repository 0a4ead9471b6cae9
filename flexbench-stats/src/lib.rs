#![warn(missing_docs)]
//! flexbench statistics
//!
//! Turns the per-iteration samples collected by a benchmark run into the
//! summary record handed to reporters:
//! - Samples are either a measured value or the failure of that iteration
//! - Min, max and average are computed over the successful samples only
//! - p95 uses the nearest-rank method (no interpolation)
//! - Failure rate counts failures against every sample, successful or not

mod percentiles;
mod sample;
mod summary;

pub use percentiles::{P95, nearest_rank};
pub use sample::{Failure, MeasureKind, Sample};
pub use summary::{BenchmarkResult, ResultMeta, Summary, compute_result, summarize};
