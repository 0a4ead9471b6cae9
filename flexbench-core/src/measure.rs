//! Measures
//!
//! A measure brackets one iteration: `start` captures a baseline right before
//! the action runs and `end` turns that baseline into the iteration's sample.
//! Each start/end pair is independent, so a measure carries no state between
//! iterations.
//!
//! A benchmark holds its measures as [`SharedMeasure`] handles. The first is
//! the primary measure (its samples become the variation's result); every
//! other one contributes a subresult.

use crate::allocator::allocation_stats;
use crate::timer::Timer;
use flexbench_stats::MeasureKind;
use std::fmt;
use std::sync::Arc;

/// Per-iteration metric strategy
pub trait Measure: Send + Sync + 'static {
    /// Baseline captured by `start`
    type State: Send + 'static;

    /// Label used for subresults and reporting
    fn label(&self) -> &str;

    /// Unit family, if the value has one
    fn kind(&self) -> Option<MeasureKind>;

    /// Capture the baseline immediately before the action
    fn start(&self) -> Self::State;

    /// Compute the sample immediately after the action
    fn end(&self, state: Self::State) -> f64;
}

trait DynMeasure: Send + Sync {
    fn label(&self) -> &str;
    fn kind(&self) -> Option<MeasureKind>;
    fn begin(self: Arc<Self>) -> Box<dyn FnOnce() -> f64 + Send>;
}

impl<M: Measure> DynMeasure for M {
    fn label(&self) -> &str {
        Measure::label(self)
    }

    fn kind(&self) -> Option<MeasureKind> {
        Measure::kind(self)
    }

    fn begin(self: Arc<Self>) -> Box<dyn FnOnce() -> f64 + Send> {
        let state = self.start();
        Box::new(move || self.end(state))
    }
}

/// Type-erased, cheaply cloneable measure handle
#[derive(Clone)]
pub struct SharedMeasure(Arc<dyn DynMeasure>);

impl SharedMeasure {
    /// Wrap a measure
    pub fn new<M: Measure>(measure: M) -> Self {
        Self(Arc::new(measure))
    }

    /// Label of the wrapped measure
    pub fn label(&self) -> &str {
        self.0.label()
    }

    /// Unit family of the wrapped measure
    pub fn kind(&self) -> Option<MeasureKind> {
        self.0.kind()
    }

    /// Capture a baseline; finish it with [`PendingSample::end`]
    pub fn start(&self) -> PendingSample {
        PendingSample(Arc::clone(&self.0).begin())
    }
}

impl fmt::Debug for SharedMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMeasure")
            .field("label", &self.label())
            .field("kind", &self.kind())
            .finish()
    }
}

impl<M: Measure> From<M> for SharedMeasure {
    fn from(measure: M) -> Self {
        SharedMeasure::new(measure)
    }
}

/// A started measurement awaiting its end
pub struct PendingSample(Box<dyn FnOnce() -> f64 + Send>);

impl PendingSample {
    /// Compute the sample
    pub fn end(self) -> f64 {
        (self.0)()
    }
}

/// Wall-clock duration of the action, in milliseconds
#[derive(Debug, Clone, Copy, Default)]
pub struct DurationMeasure;

impl Measure for DurationMeasure {
    type State = Timer;

    fn label(&self) -> &str {
        "duration"
    }

    fn kind(&self) -> Option<MeasureKind> {
        Some(MeasureKind::Time)
    }

    #[inline]
    fn start(&self) -> Timer {
        Timer::start()
    }

    #[inline]
    fn end(&self, timer: Timer) -> f64 {
        timer.elapsed_ms()
    }
}

/// Hardware ticks spent in the action (0 where no tick counter exists)
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleMeasure;

impl Measure for CycleMeasure {
    type State = Timer;

    fn label(&self) -> &str {
        "cpu:cycles"
    }

    fn kind(&self) -> Option<MeasureKind> {
        None
    }

    fn start(&self) -> Timer {
        Timer::start()
    }

    fn end(&self, timer: Timer) -> f64 {
        timer.elapsed_cycles() as f64
    }
}

/// Process memory metric tracked by [`MemoryMeasure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryMetric {
    /// Resident set size
    Rss,
    /// Bytes live on the heap
    HeapUsed,
    /// Bytes requested from the heap
    HeapAllocated,
    /// Number of heap allocations
    Allocations,
}

impl MemoryMetric {
    fn label(self) -> &'static str {
        match self {
            MemoryMetric::Rss => "memory:rss",
            MemoryMetric::HeapUsed => "memory:heap_used",
            MemoryMetric::HeapAllocated => "memory:heap_allocated",
            MemoryMetric::Allocations => "memory:allocations",
        }
    }

    fn read(self) -> f64 {
        match self {
            MemoryMetric::Rss => resident_set_bytes() as f64,
            MemoryMetric::HeapUsed => allocation_stats().live_bytes as f64,
            MemoryMetric::HeapAllocated => allocation_stats().allocated_bytes as f64,
            MemoryMetric::Allocations => allocation_stats().allocations as f64,
        }
    }
}

/// Delta of a process memory metric across the action, clamped to ≥ 0.
///
/// Heap metrics need [`TrackingAllocator`](crate::TrackingAllocator) installed
/// as the global allocator. Memory can be released mid-iteration, which shows
/// up as a negative delta; that is noise and reported as 0.
#[derive(Debug, Clone, Copy)]
pub struct MemoryMeasure {
    metric: MemoryMetric,
}

impl MemoryMeasure {
    /// Resident set size of the whole process
    pub fn rss() -> Self {
        Self::new(MemoryMetric::Rss)
    }

    /// Bytes live on the heap
    pub fn heap_used() -> Self {
        Self::new(MemoryMetric::HeapUsed)
    }

    /// Bytes requested from the heap, including memory freed again
    pub fn heap_allocated() -> Self {
        Self::new(MemoryMetric::HeapAllocated)
    }

    /// Number of heap allocations
    pub fn allocations() -> Self {
        Self::new(MemoryMetric::Allocations)
    }

    /// Measure an arbitrary metric
    pub fn new(metric: MemoryMetric) -> Self {
        Self { metric }
    }

    /// Tracked metric
    pub fn metric(&self) -> MemoryMetric {
        self.metric
    }
}

impl Measure for MemoryMeasure {
    type State = f64;

    fn label(&self) -> &str {
        self.metric.label()
    }

    fn kind(&self) -> Option<MeasureKind> {
        match self.metric {
            MemoryMetric::Allocations => None,
            _ => Some(MeasureKind::Size),
        }
    }

    fn start(&self) -> f64 {
        self.metric.read()
    }

    fn end(&self, baseline: f64) -> f64 {
        (self.metric.read() - baseline).max(0.0)
    }
}

#[cfg(target_os = "linux")]
fn resident_set_bytes() -> u64 {
    // statm: size resident shared text lib data dt, in pages
    let Ok(statm) = std::fs::read_to_string("/proc/self/statm") else {
        return 0;
    };
    let resident = statm
        .split_whitespace()
        .nth(1)
        .and_then(|pages| pages.parse::<u64>().ok())
        .unwrap_or(0);

    // SAFETY: sysconf has no preconditions
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    resident * page_size.max(0) as u64
}

#[cfg(not(target_os = "linux"))]
fn resident_set_bytes() -> u64 {
    0
}

/// Measure built from closures, see [`custom`]
pub struct CustomMeasure<S, Start, End> {
    label: String,
    kind: Option<MeasureKind>,
    start: Start,
    end: End,
    _state: std::marker::PhantomData<fn() -> S>,
}

impl<S, Start, End> Measure for CustomMeasure<S, Start, End>
where
    S: Send + 'static,
    Start: Fn() -> S + Send + Sync + 'static,
    End: Fn(S) -> f64 + Send + Sync + 'static,
{
    type State = S;

    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> Option<MeasureKind> {
        self.kind
    }

    fn start(&self) -> S {
        (self.start)()
    }

    fn end(&self, state: S) -> f64 {
        (self.end)(state)
    }
}

/// Build a measure from a pair of closures.
///
/// ```
/// use flexbench_core::measure;
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// static CALLS: AtomicU64 = AtomicU64::new(0);
///
/// let api_calls = measure::custom(
///     "api_calls",
///     None,
///     || CALLS.load(Ordering::Relaxed),
///     |before: u64| (CALLS.load(Ordering::Relaxed) - before) as f64,
/// );
/// assert_eq!(api_calls.label(), "api_calls");
/// ```
pub fn custom<S, Start, End>(
    label: impl Into<String>,
    kind: Option<MeasureKind>,
    start: Start,
    end: End,
) -> SharedMeasure
where
    S: Send + 'static,
    Start: Fn() -> S + Send + Sync + 'static,
    End: Fn(S) -> f64 + Send + Sync + 'static,
{
    SharedMeasure::new(CustomMeasure {
        label: label.into(),
        kind,
        start,
        end,
        _state: std::marker::PhantomData,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    #[test]
    fn test_duration_measure() {
        let measure = SharedMeasure::new(DurationMeasure);
        assert_eq!(measure.label(), "duration");
        assert_eq!(measure.kind(), Some(MeasureKind::Time));

        let pending = measure.start();
        std::thread::sleep(Duration::from_millis(5));
        let ms = pending.end();
        assert!(ms >= 4.0, "expected >= 4ms, got {ms}");
    }

    #[test]
    fn test_pairs_are_independent() {
        let measure = SharedMeasure::new(DurationMeasure);
        let slow = measure.start();
        std::thread::sleep(Duration::from_millis(5));
        let fast = measure.start();

        let fast_ms = fast.end();
        let slow_ms = slow.end();
        assert!(slow_ms > fast_ms);
    }

    #[test]
    fn test_memory_labels_and_kinds() {
        assert_eq!(Measure::label(&MemoryMeasure::rss()), "memory:rss");
        assert_eq!(Measure::label(&MemoryMeasure::heap_used()), "memory:heap_used");
        assert_eq!(
            Measure::label(&MemoryMeasure::heap_allocated()),
            "memory:heap_allocated"
        );
        assert_eq!(Measure::kind(&MemoryMeasure::rss()), Some(MeasureKind::Size));
        assert_eq!(Measure::kind(&MemoryMeasure::allocations()), None);
    }

    #[test]
    fn test_memory_delta_is_never_negative() {
        for measure in [
            MemoryMeasure::rss(),
            MemoryMeasure::heap_used(),
            MemoryMeasure::heap_allocated(),
            MemoryMeasure::allocations(),
        ] {
            let baseline = measure.start();
            let buffer = std::hint::black_box(vec![0u8; 1 << 16]);
            drop(buffer);
            assert!(measure.end(baseline) >= 0.0);
            // A baseline from the future still clamps to zero
            assert_eq!(measure.end(f64::MAX), 0.0);
        }
    }

    #[test]
    fn test_heap_allocated_sees_allocation() {
        let measure = MemoryMeasure::heap_allocated();
        let baseline = measure.start();
        let buffer = std::hint::black_box(vec![7u8; 8192]);
        let delta = measure.end(baseline);
        drop(buffer);
        assert!(delta >= 8192.0, "delta was {delta}");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_rss_is_readable() {
        assert!(resident_set_bytes() > 0);
    }

    #[test]
    fn test_custom_measure() {
        let counter = std::sync::Arc::new(AtomicU64::new(10));
        let reader = counter.clone();
        let measure = custom(
            "counter",
            Some(MeasureKind::Size),
            move || reader.load(Ordering::SeqCst),
            {
                let reader = counter.clone();
                move |before: u64| (reader.load(Ordering::SeqCst) - before) as f64
            },
        );

        let pending = measure.start();
        counter.fetch_add(3, Ordering::SeqCst);
        assert_eq!(pending.end(), 3.0);
        assert_eq!(measure.label(), "counter");
        assert_eq!(measure.kind(), Some(MeasureKind::Size));
    }
}
