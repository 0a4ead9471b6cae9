//! Monotonic Timing
//!
//! Wall-clock time comes from `std::time::Instant`. On x86_64 and AArch64 a
//! hardware tick counter is read alongside it so `cpu:cycles` measures can
//! report raw ticks; elsewhere the tick count is always 0.

use std::time::{Duration, Instant};

/// Whether this platform provides a hardware tick counter.
pub const HAS_CYCLE_COUNTER: bool = cfg!(any(target_arch = "x86_64", target_arch = "aarch64"));

mod ticks {
    #[cfg(target_arch = "x86_64")]
    #[inline(always)]
    pub(super) fn now() -> u64 {
        // SAFETY: RDTSC is part of the x86_64 baseline and has no side effects
        unsafe { core::arch::x86_64::_rdtsc() }
    }

    #[cfg(target_arch = "aarch64")]
    #[inline(always)]
    pub(super) fn now() -> u64 {
        let value: u64;
        // SAFETY: the virtual counter is readable from user space
        unsafe {
            core::arch::asm!(
                "mrs {value}, cntvct_el0",
                value = out(reg) value,
                options(nomem, nostack, preserves_flags)
            );
        }
        value
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    #[inline(always)]
    pub(super) fn now() -> u64 {
        0
    }
}

/// Started stopwatch
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    started: Instant,
    ticks: u64,
}

impl Timer {
    /// Start a stopwatch now
    #[inline(always)]
    pub fn start() -> Self {
        let ticks = ticks::now();
        Self {
            started: Instant::now(),
            ticks,
        }
    }

    /// Wall-clock time since [`Timer::start`]
    #[inline(always)]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Milliseconds since start, with sub-millisecond precision
    #[inline(always)]
    pub fn elapsed_ms(&self) -> f64 {
        duration_ms(self.elapsed())
    }

    /// Hardware ticks since start (0 without a cycle counter)
    #[inline(always)]
    pub fn elapsed_cycles(&self) -> u64 {
        ticks::now().saturating_sub(self.ticks)
    }
}

/// Convert a duration to fractional milliseconds
pub fn duration_ms(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_covers_sleep() {
        let timer = Timer::start();
        std::thread::sleep(Duration::from_millis(8));
        let ms = timer.elapsed_ms();
        assert!(ms >= 8.0, "elapsed {ms}ms");
        assert!(timer.elapsed() >= Duration::from_millis(8));
    }

    #[test]
    fn test_ticks_never_go_backwards() {
        let timer = Timer::start();
        let first = timer.elapsed_cycles();
        let second = timer.elapsed_cycles();
        match HAS_CYCLE_COUNTER {
            true => assert!(second >= first),
            false => assert_eq!((first, second), (0, 0)),
        }
    }

    #[test]
    fn test_duration_ms() {
        assert_eq!(duration_ms(Duration::from_micros(1500)), 1.5);
        assert_eq!(duration_ms(Duration::from_secs(2)), 2_000.0);
        assert_eq!(duration_ms(Duration::ZERO), 0.0);
    }
}
