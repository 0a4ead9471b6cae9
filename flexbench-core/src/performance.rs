//! Named Performance Spans
//!
//! Code under benchmark can publish named timings with [`record`] or the
//! [`span`] guard. A benchmark configured with
//! [`with_performance_observer`](crate::Benchmark::with_performance_observer)
//! connects a [`PerformanceWatcher`] that collects them and turns every name
//! into a subresult of the variation that was running.
//!
//! Entries published while no watcher is connected are dropped.

use crate::timer::{Timer, duration_ms};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// One published timing
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceEntry {
    /// Span name
    pub name: String,
    /// Duration in milliseconds
    pub duration: f64,
}

type Filter = Arc<dyn Fn(&PerformanceEntry) -> bool + Send + Sync>;

/// Rename rule for collected entries
#[derive(Clone)]
pub enum LabelTransform {
    /// Look the name up; names missing from the map keep their original name
    Map(HashMap<String, String>),
    /// Compute the new name
    Fn(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl LabelTransform {
    fn apply(&self, name: &str) -> String {
        match self {
            LabelTransform::Map(map) => map.get(name).cloned().unwrap_or_else(|| name.to_string()),
            LabelTransform::Fn(f) => f(name),
        }
    }
}

/// Options for a [`PerformanceWatcher`]
#[derive(Clone, Default)]
pub struct PerformanceObserverOptions {
    measure_filter: Option<Filter>,
    label: Option<LabelTransform>,
}

impl PerformanceObserverOptions {
    /// Collect every entry under its own name
    pub fn new() -> Self {
        Self::default()
    }

    /// Only collect entries for which `filter` returns true
    pub fn with_measure_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&PerformanceEntry) -> bool + Send + Sync + 'static,
    {
        self.measure_filter = Some(Arc::new(filter));
        self
    }

    /// Rename entries through a lookup table
    pub fn with_label_map<K, V>(mut self, map: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let map = map.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.label = Some(LabelTransform::Map(map));
        self
    }

    /// Rename entries with a function
    pub fn with_label_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.label = Some(LabelTransform::Fn(Arc::new(f)));
        self
    }
}

impl fmt::Debug for PerformanceObserverOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerformanceObserverOptions")
            .field("measure_filter", &self.measure_filter.is_some())
            .field("label", &self.label.is_some())
            .finish()
    }
}

struct Collector {
    options: PerformanceObserverOptions,
    // First-seen order of names
    measures: Mutex<Vec<(String, Vec<f64>)>>,
}

impl Collector {
    fn observe(&self, entry: &PerformanceEntry) {
        if let Some(filter) = &self.options.measure_filter {
            if !filter(entry) {
                return;
            }
        }
        let label = match &self.options.label {
            Some(transform) => transform.apply(&entry.name),
            None => entry.name.clone(),
        };

        let mut measures = self.measures.lock();
        match measures.iter_mut().find(|(name, _)| *name == label) {
            Some((_, durations)) => durations.push(entry.duration),
            None => measures.push((label, vec![entry.duration])),
        }
    }
}

static OBSERVERS: Mutex<Vec<Weak<Collector>>> = parking_lot::const_mutex(Vec::new());

/// Collects published entries until disconnected
pub struct PerformanceWatcher {
    collector: Arc<Collector>,
}

impl PerformanceWatcher {
    /// Start collecting
    pub fn connect(options: PerformanceObserverOptions) -> Self {
        let collector = Arc::new(Collector {
            options,
            measures: Mutex::new(Vec::new()),
        });
        OBSERVERS.lock().push(Arc::downgrade(&collector));
        Self { collector }
    }

    /// Collected durations per name. Yields to the runtime first so entries
    /// published by tasks the action spawned get a chance to land.
    pub async fn measures(&self) -> Vec<(String, Vec<f64>)> {
        tokio::task::yield_now().await;
        self.collector.measures.lock().clone()
    }

    /// Forget everything collected so far
    pub fn clear(&self) {
        self.collector.measures.lock().clear();
    }

    /// Stop collecting
    pub fn disconnect(self) {
        drop(self);
    }
}

impl Drop for PerformanceWatcher {
    fn drop(&mut self) {
        let me = Arc::as_ptr(&self.collector);
        OBSERVERS
            .lock()
            .retain(|weak| weak.strong_count() > 0 && !std::ptr::eq(weak.as_ptr(), me));
    }
}

/// Publish a named timing to every connected watcher
pub fn record(name: impl Into<String>, duration: Duration) {
    let entry = PerformanceEntry {
        name: name.into(),
        duration: duration_ms(duration),
    };

    let observers: Vec<Arc<Collector>> = {
        let mut observers = OBSERVERS.lock();
        observers.retain(|weak| weak.strong_count() > 0);
        observers.iter().filter_map(Weak::upgrade).collect()
    };
    for collector in observers {
        collector.observe(&entry);
    }
}

/// Guard that publishes its lifetime as a named timing when dropped
#[must_use = "the span is recorded when the guard is dropped"]
pub struct Span {
    name: Option<String>,
    timer: Timer,
}

impl Span {
    /// Stop now instead of at end of scope
    pub fn end(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if let Some(name) = self.name.take() {
            record(name, self.timer.elapsed());
        }
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Start a named span
pub fn span(name: impl Into<String>) -> Span {
    Span {
        name: Some(name.into()),
        timer: Timer::start(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Watchers in other tests see these entries too, so names are unique per test

    #[tokio::test]
    async fn test_collects_in_first_seen_order() {
        let watcher = PerformanceWatcher::connect(
            PerformanceObserverOptions::new()
                .with_measure_filter(|e| e.name.starts_with("perf-order:")),
        );
        record("perf-order:b", Duration::from_millis(2));
        record("perf-order:a", Duration::from_millis(1));
        record("perf-order:b", Duration::from_millis(4));

        let measures = watcher.measures().await;
        assert_eq!(
            measures,
            vec![
                ("perf-order:b".to_string(), vec![2.0, 4.0]),
                ("perf-order:a".to_string(), vec![1.0]),
            ]
        );

        watcher.clear();
        assert!(watcher.measures().await.is_empty());
    }

    #[tokio::test]
    async fn test_label_map_keeps_unmapped_names() {
        let watcher = PerformanceWatcher::connect(
            PerformanceObserverOptions::new()
                .with_measure_filter(|e| e.name.starts_with("perf-map:"))
                .with_label_map([("perf-map:parse", "parse")]),
        );
        record("perf-map:parse", Duration::from_millis(1));
        record("perf-map:other", Duration::from_millis(1));

        let names: Vec<String> = watcher.measures().await.into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["parse", "perf-map:other"]);
    }

    #[tokio::test]
    async fn test_label_fn_and_span() {
        let watcher = PerformanceWatcher::connect(
            PerformanceObserverOptions::new()
                .with_measure_filter(|e| e.name.starts_with("perf-fn:"))
                .with_label_fn(|name| name.trim_start_matches("perf-fn:").to_uppercase()),
        );
        {
            let _span = span("perf-fn:io");
            std::thread::sleep(Duration::from_millis(2));
        }
        span("perf-fn:io").end();

        let measures = watcher.measures().await;
        assert_eq!(measures.len(), 1);
        assert_eq!(measures[0].0, "IO");
        assert_eq!(measures[0].1.len(), 2);
        assert!(measures[0].1[0] >= 1.0);
    }

    #[tokio::test]
    async fn test_disconnect_stops_collection() {
        let watcher = PerformanceWatcher::connect(
            PerformanceObserverOptions::new().with_measure_filter(|e| e.name == "perf-disc"),
        );
        let collector = Arc::downgrade(&watcher.collector);
        watcher.disconnect();
        record("perf-disc", Duration::from_millis(1));
        assert!(collector.upgrade().is_none());
    }
}
