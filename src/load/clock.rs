//! Cycle counter readers.
//!
//! The counter rate is never assumed: every tick count is converted to
//! physical time through a per-cpu [`Calibration`](super::calibrate::Calibration).

use std::thread;
use std::time::Duration;

/// Monotonic tick source plus the real-time sleep the engine pairs with it.
pub trait Clock {
    /// Current counter value. Wraparound is not handled.
    fn ticks(&self) -> u64;

    /// Real-time sleep, not cancellable.
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }

    fn name(&self) -> &'static str;
}

/// Time stamp counter, read with RDTSC.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Clone, Copy, Default)]
pub struct Tsc;

#[cfg(target_arch = "x86_64")]
impl Clock for Tsc {
    #[inline]
    fn ticks(&self) -> u64 {
        // SAFETY: RDTSC is available on every x86_64 cpu.
        unsafe { core::arch::x86_64::_rdtsc() }
    }

    fn name(&self) -> &'static str {
        "tsc"
    }
}

/// CLOCK_MONOTONIC in nanoseconds, for targets without a usable cycle counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Monotonic;

impl Clock for Monotonic {
    fn ticks(&self) -> u64 {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
        }
        (ts.tv_sec as u64)
            .wrapping_mul(1_000_000_000)
            .wrapping_add(ts.tv_nsec as u64)
    }

    fn name(&self) -> &'static str {
        "monotonic"
    }
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    use core::arch::x86_64::__cpuid;
    use core::sync::atomic::{AtomicU8, Ordering};

    // 0 = unchecked, 1 = absent, 2 = present
    static INVARIANT_TSC: AtomicU8 = AtomicU8::new(0);

    /// Checks CPUID leaf 0x80000007, EDX bit 8: the TSC ticks at a constant
    /// rate across P-, C- and T-states.
    pub fn has_invariant_tsc() -> bool {
        let cached = INVARIANT_TSC.load(Ordering::Relaxed);
        if cached != 0 {
            return cached == 2;
        }

        // SAFETY: CPUID is always available on x86_64.
        let present = unsafe {
            __cpuid(0x8000_0000).eax >= 0x8000_0007 && (__cpuid(0x8000_0007).edx >> 8) & 1 == 1
        };
        INVARIANT_TSC.store(if present { 2 } else { 1 }, Ordering::Relaxed);
        present
    }
}

/// The counter workers actually spin on, picked once per process.
#[derive(Debug, Clone, Copy)]
pub enum SystemClock {
    #[cfg(target_arch = "x86_64")]
    Tsc(Tsc),
    Monotonic(Monotonic),
}

impl SystemClock {
    /// TSC when it is invariant, CLOCK_MONOTONIC otherwise.
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if x86::has_invariant_tsc() {
                return SystemClock::Tsc(Tsc);
            }
        }
        SystemClock::Monotonic(Monotonic)
    }
}

impl Clock for SystemClock {
    #[inline]
    fn ticks(&self) -> u64 {
        match self {
            #[cfg(target_arch = "x86_64")]
            SystemClock::Tsc(c) => c.ticks(),
            SystemClock::Monotonic(c) => c.ticks(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            #[cfg(target_arch = "x86_64")]
            SystemClock::Tsc(c) => c.name(),
            SystemClock::Monotonic(c) => c.name(),
        }
    }
}
