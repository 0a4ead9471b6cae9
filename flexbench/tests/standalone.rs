//! Integration tests for standalone declarations
//!
//! Standalone benchmarks share one process-wide queue and the installed
//! defaults, so everything here runs in a single test.

use flexbench::prelude::*;
use flexbench::{BenchmarkDefaults, Lazy, NoopReporter, configure};
use parking_lot::Mutex;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

type Log = Arc<Mutex<Vec<(&'static str, String)>>>;

const VAR: &str = "FLEXBENCH_STANDALONE_VALUE";
const OWNER: &str = "FLEXBENCH_STANDALONE_OWNER";

// Each action writes its own name into the environment, yields across a
// timer, then reads both variables back.
fn declare(name: &'static str, value: &'static str, log: Log) -> Lazy<Vec<BenchmarkResult>> {
    benchmark(name, move |b| async move {
        b.with_variation(Variation::new("only").with_environment_variable(VAR, value))
            .with_action(move |_| {
                let log = log.clone();
                async move {
                    // SAFETY: standalone benchmarks run one at a time under the
                    // environment lock, so nothing else touches the environment
                    unsafe { std::env::set_var(OWNER, name) };
                    tokio::time::sleep(Duration::from_millis(2)).await;

                    let owner = std::env::var(OWNER).unwrap_or_default();
                    let seen = match owner == name {
                        true => std::env::var(VAR).unwrap_or_default(),
                        false => format!("overwritten by {owner}"),
                    };
                    log.lock().push((name, seen));
                    Ok(())
                }
            })
            .with_reporter(NoopReporter)
    })
}

/// Test that standalone benchmarks run one at a time in declaration order
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_standalone_declarations() {
    configure(BenchmarkDefaults {
        iterations: Some(3),
        ..BenchmarkDefaults::default()
    });

    let log: Log = Arc::default();
    let first = declare("first", "1", log.clone());
    let second = declare("second", "2", log.clone());

    // Awaiting the later one first still runs them in declaration order
    let (second, first) = tokio::join!(second.into_future(), first.into_future());
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_eq!(first[0].raw.len(), 3);
    assert_eq!(second[0].raw.len(), 3);

    let expected: Vec<(&str, String)> = [("first", "1"), ("second", "2")]
        .iter()
        .flat_map(|&(name, value)| std::iter::repeat_n((name, value.to_string()), 3))
        .collect();
    assert_eq!(*log.lock(), expected);
    assert!(std::env::var_os(VAR).is_none());
    assert!(std::env::var_os(OWNER).is_none());

    // A failing predecessor does not block the next benchmark
    let broken = benchmark("broken", |b| async move { b });
    let after = declare("after", "3", log.clone());
    assert!(after.await.is_ok());
    assert!(matches!(
        broken.peek(),
        Some(Err(BenchError::MissingAction { .. }))
    ));

    // Handles that are never awaited are driven by run_pending
    log.lock().clear();
    drop(declare("forgotten", "4", log.clone()));
    drop(suite("pending suite", |s| async move {
        benchmark("inner", |b| async move {
            b.with_iterations(1)
                .with_action(|_| async { Ok(()) })
                .with_reporter(NoopReporter)
        });
        s.with_reporter(NoopReporter)
    }));
    run_pending().await.unwrap();
    assert_eq!(log.lock().len(), 3);
    assert!(log.lock().iter().all(|(name, value)| *name == "forgotten" && value == "4"));

    // The first failure among pending declarations is returned
    drop(benchmark("unfinished", |b| async move { b }));
    let err = run_pending().await.unwrap_err();
    assert!(matches!(err, BenchError::MissingAction { benchmark } if benchmark == "unfinished"));

    configure(BenchmarkDefaults::default());
}
