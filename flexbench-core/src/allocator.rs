//! Allocation Tracking
//!
//! `TrackingAllocator` forwards to the system allocator and keeps process-wide
//! counters that the heap memory measures read. Install it in the benchmark
//! binary:
//!
//! ```ignore
//! #[global_allocator]
//! static GLOBAL: flexbench_core::TrackingAllocator = flexbench_core::TrackingAllocator;
//! ```
//!
//! Without it the counters stay at zero and heap measures report 0.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static ALLOCATED_BYTES: AtomicU64 = AtomicU64::new(0);
static ALLOCATIONS: AtomicU64 = AtomicU64::new(0);
static LIVE_BYTES: AtomicU64 = AtomicU64::new(0);
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Global allocator that counts allocations
pub struct TrackingAllocator;

impl TrackingAllocator {
    #[inline]
    fn on_alloc(size: usize) {
        let size = size as u64;
        ALLOCATED_BYTES.fetch_add(size, Ordering::Relaxed);
        ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
        LIVE_BYTES.fetch_add(size, Ordering::Relaxed);
        INSTALLED.store(true, Ordering::Relaxed);
    }

    #[inline]
    fn on_dealloc(size: usize) {
        LIVE_BYTES.fetch_sub(size as u64, Ordering::Relaxed);
    }
}

// SAFETY: every call is forwarded unchanged to `System`; the counters are
// plain atomics and never allocate.
unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            Self::on_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            Self::on_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        Self::on_dealloc(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            // A move counts as a fresh allocation of the new size
            Self::on_dealloc(layout.size());
            Self::on_alloc(new_size);
        }
        new_ptr
    }
}

/// Snapshot of the allocation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationStats {
    /// Bytes requested since process start
    pub allocated_bytes: u64,
    /// Allocation calls since process start
    pub allocations: u64,
    /// Bytes currently allocated and not yet freed
    pub live_bytes: u64,
}

/// Read the allocation counters
#[inline]
pub fn allocation_stats() -> AllocationStats {
    AllocationStats {
        allocated_bytes: ALLOCATED_BYTES.load(Ordering::Relaxed),
        allocations: ALLOCATIONS.load(Ordering::Relaxed),
        live_bytes: LIVE_BYTES.load(Ordering::Relaxed),
    }
}

/// Whether `TrackingAllocator` has served at least one allocation
pub fn is_tracking() -> bool {
    INSTALLED.load(Ordering::Relaxed)
}

#[cfg(test)]
#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator;
