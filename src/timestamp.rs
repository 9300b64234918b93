//! C1 — timestamp service.
//!
//! Calibrates a monotonic cycle counter against wall-clock at startup and
//! exposes `now_cycles()` / `cycles_to_ns()`. On x86_64 the counter is the
//! CPU's TSC read via `_rdtsc()`, calibrated the way
//! `utils/timestamp.c` does it: warm up, sample `(tsc, wall_ns)`, sleep at
//! least 100ms, sample again, multiplier = delta wall / delta tsc. `quanta`
//! already performs this calibration internally and is used here rather
//! than hand-rolling it a second time. On non-x86_64 targets there is no
//! portable cheap cycle counter, so the counter degrades to
//! `Instant`-derived nanoseconds with a 1:1 multiplier — an explicit,
//! documented degradation, not a silent one.

use quanta::Clock;
#[cfg(not(target_arch = "x86_64"))]
use std::time::Instant;

/// Calibrated cycles<->nanoseconds conversion. No re-calibration during run.
pub struct Timestamp {
    #[cfg(target_arch = "x86_64")]
    clock: Clock,
    #[cfg(not(target_arch = "x86_64"))]
    start: Instant,
}

impl Timestamp {
    /// Runs the calibration loop once at startup.
    pub fn calibrate() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            // Warm up the TSC a handful of reads before trusting it, matching
            // the original's 10-iteration warmup.
            let clock = Clock::new();
            for _ in 0..10 {
                std::hint::black_box(clock.raw());
            }
            Self { clock }
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            Self { start: Instant::now() }
        }
    }

    /// Monotonic cycle counter, readable in well under 10ns on x86_64.
    #[inline(always)]
    pub fn now_cycles(&self) -> u64 {
        #[cfg(target_arch = "x86_64")]
        {
            self.clock.raw()
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            self.start.elapsed().as_nanos() as u64
        }
    }

    /// Convert a cycle-counter delta to nanoseconds using the calibrated
    /// multiplier. On the fallback path cycles already are nanoseconds.
    #[inline]
    pub fn cycles_to_ns(&self, cycles: u64) -> u64 {
        #[cfg(target_arch = "x86_64")]
        {
            self.clock.delta(0, cycles).as_nanos() as u64
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            cycles
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_cycles_is_monotonic_nondecreasing() {
        let ts = Timestamp::calibrate();
        let a = ts.now_cycles();
        let b = ts.now_cycles();
        assert!(b >= a);
    }

    #[test]
    fn cycles_to_ns_scales_up_with_larger_delta() {
        let ts = Timestamp::calibrate();
        let small = ts.cycles_to_ns(1_000);
        let large = ts.cycles_to_ns(10_000);
        assert!(large >= small);
    }
}
