//! FlexBench Example Benchmarks
//!
//! This example demonstrates FlexBench features and serves as a template for
//! creating your own benchmark suite.
//!
//! Run with:
//!   cargo run --example benchmarks
//!   RUST_LOG=flexbench=debug cargo run --example benchmarks

use flexbench::prelude::*;
use flexbench::{MeasureKind, PerformanceObserverOptions, measures, performance};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static LOOKUPS: AtomicU64 = AtomicU64::new(0);

fn fibonacci(n: u64) -> u64 {
    if n < 2 { n } else { fibonacci(n - 1) + fibonacci(n - 2) }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // flexbench.toml, if present, supplies defaults and the log filter
    flexbench::init()?;

    // ========================================================================
    // Suite with shared variations
    // ========================================================================

    suite("compute", |s| async move {
        variation("small", |v| v.with_context("n", 15u64));
        variation("large", |v| v.with_context("n", 25u64));

        benchmark("fibonacci", |b| async move {
            b.with_iterations(10)
                .with_warmup_iterations(2)
                .with_action(|v| async move { Ok(fibonacci(v.get_or_default("n", 10u64))) })
        });

        benchmark("sorting", |b| async move {
            measure(DurationMeasure);
            measure(MemoryMeasure::allocations());
            b.with_iterations(10).with_action(|v| async move {
                let n = v.get_or_default("n", 10u64) * 1_000;
                let mut data: Vec<u64> = (0..n).rev().collect();
                data.sort_unstable();
                Ok(data)
            })
        });

        s
    });

    // ========================================================================
    // Context variations and hooks
    // ========================================================================

    let tables = [
        ("hundred", Arc::new((0..100u64).map(|i| (i, i * i)).collect::<HashMap<_, _>>())),
        ("million", Arc::new((0..1_000_000u64).map(|i| (i, i * i)).collect::<HashMap<_, _>>())),
    ];

    describe("lookups", move |s| async move {
        it("hashmap get", move |b| async move {
            before_each(|_| async {
                LOOKUPS.store(0, Ordering::Relaxed);
                Ok(())
            });
            measure(measures::custom(
                "lookups",
                None,
                || LOOKUPS.load(Ordering::Relaxed),
                |before: u64| (LOOKUPS.load(Ordering::Relaxed) - before) as f64,
            ));
            measure(DurationMeasure);

            b.with_variations(Variation::from_contexts("table", tables))
                .with_iterations(25)
                .with_action(|v| async move {
                    let table = v
                        .get::<Arc<HashMap<u64, u64>>>("table")
                        .ok_or_else(|| anyhow::anyhow!("missing table"))?;
                    let hits = (0..1_000u64).filter_map(|k| table.get(&k)).count();
                    LOOKUPS.fetch_add(1_000, Ordering::Relaxed);
                    anyhow::Ok(hits)
                })
        });
        s
    });

    // ========================================================================
    // Standalone benchmarks
    // ========================================================================

    benchmark("environment", |b| async move {
        b.with_variations(Variation::from_environment_variables([
            ("DEMO_MODE", ["fast", "thorough"]),
            ("DEMO_LEVEL", ["1", "2"]),
        ]))
        .with_iterations(5)
        .with_action(|_| async {
            let rounds = match std::env::var("DEMO_MODE").as_deref() {
                Ok("thorough") => 50_000,
                _ => 5_000,
            };
            let level: u64 = std::env::var("DEMO_LEVEL")?.parse()?;
            anyhow::Ok((0..rounds).map(|i| i * level).sum::<u64>())
        })
    });

    benchmark("phases", |b| async move {
        b.with_iterations(5)
            .with_performance_observer(
                PerformanceObserverOptions::new()
                    .with_measure_filter(|entry| entry.name.starts_with("phase:"))
                    .with_label_map([("phase:parse", "parse"), ("phase:render", "render")]),
            )
            .with_action(|_| async {
                let span = performance::span("phase:parse");
                let words: Vec<String> = "the quick brown fox jumps over the lazy dog"
                    .repeat(500)
                    .split_whitespace()
                    .map(str::to_uppercase)
                    .collect();
                span.end();

                let span = performance::span("phase:render");
                let page = words.join(" ");
                span.end();
                Ok(page.len())
            })
    });

    // Tolerates flaky iterations, then reports the failure rate
    benchmark("flaky", |b| async move {
        b.with_iterations(20)
            .with_error_strategy(ErrorStrategy::Continue)
            .with_measure(measures::custom(
                "bytes",
                Some(MeasureKind::Size),
                || (),
                |_: ()| 1024.0,
            ))
            .with_action(|_| async {
                if rand::random::<f64>() < 0.2 {
                    anyhow::bail!("simulated failure");
                }
                Ok(())
            })
    });

    #[cfg(unix)]
    benchmark("shell", |b| async move {
        b.with_command("sleep")
            .with_variations(Variation::from_cli_args([CliArg::one_of(["0.01", "0.02"])]))
            .with_iterations(3)
    });

    xbenchmark("disabled", |b| async move { b });

    run_pending().await?;
    Ok(())
}
