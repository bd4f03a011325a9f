use std::time::Duration;

use crate::config::{LoadMode, RunConfig};
use crate::error::Error;

use super::clock::Clock;

/// Per-cpu conversion between counter ticks and physical time.
///
/// Computed once per worker right after the calibration sleep and never
/// recomputed, so every tick-based duration on one cpu shares one rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    /// Ticks elapsed during one sample window.
    pub cycles_per_sample: u64,
    /// Ticks in the whole run.
    pub cycles_per_timeout: u64,
    /// Ticks in one wave period.
    pub cycles_per_period: u64,
    sample_ms: u64,
}

impl Calibration {
    /// Derives the timeout and period tick counts from a measured window.
    pub fn from_sample(
        cpu: usize,
        cycles_per_sample: u64,
        cfg: &RunConfig,
    ) -> Result<Self, Error> {
        if cycles_per_sample == 0 {
            return Err(Error::Calibration {
                cpu,
                msg: format!(
                    "cycle counter did not advance during a {} ms sleep",
                    cfg.sample_ms
                ),
            });
        }
        if cfg.sample_ms == 0 {
            return Err(Error::Calibration {
                cpu,
                msg: "sample length is 0 ms".into(),
            });
        }

        let mut cal = Calibration {
            cycles_per_sample,
            cycles_per_timeout: 0,
            cycles_per_period: 0,
            sample_ms: cfg.sample_ms,
        };
        cal.cycles_per_timeout = cal.us_to_ticks(cfg.timeout_secs.saturating_mul(1_000_000));
        cal.cycles_per_period = cal.us_to_ticks(cfg.period_secs.saturating_mul(1_000_000));

        if cal.cycles_per_timeout == 0 {
            return Err(Error::Calibration {
                cpu,
                msg: "run duration rounds down to 0 ticks".into(),
            });
        }
        if cfg.mode == LoadMode::Wave && cal.cycles_per_period == 0 {
            return Err(Error::Calibration {
                cpu,
                msg: "wave period rounds down to 0 ticks".into(),
            });
        }

        Ok(cal)
    }

    /// usec * cycles_per_sample / sample_ms / 1000, saturating at u64::MAX.
    pub fn us_to_ticks(&self, usec: u64) -> u64 {
        let ticks = usec as u128 * self.cycles_per_sample as u128 / self.sample_ms as u128 / 1000;
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }

    /// Observed counter rate in MHz.
    pub fn ticks_per_us(&self) -> f64 {
        self.cycles_per_sample as f64 / (self.sample_ms as f64 * 1000.0)
    }
}

/// Measures how many ticks one real-time sample window spans on the calling cpu.
pub fn measure_sample<C: Clock>(clock: &C, sample_ms: u64) -> u64 {
    let begin = clock.ticks();
    clock.sleep(Duration::from_millis(sample_ms));
    clock.ticks().saturating_sub(begin)
}

/// Calibrates the calling thread's cpu. Must run after the thread is pinned.
pub fn calibrate<C: Clock>(clock: &C, cpu: usize, cfg: &RunConfig) -> Result<Calibration, Error> {
    let cycles_per_sample = measure_sample(clock, cfg.sample_ms);
    let cal = Calibration::from_sample(cpu, cycles_per_sample, cfg)?;
    log::debug!(
        target: "cpuload::worker",
        "cpu {}: {} {} ticks/sample, {} ticks/timeout, {} ticks/period",
        cpu,
        clock.name(),
        cal.cycles_per_sample,
        cal.cycles_per_timeout,
        cal.cycles_per_period,
    );
    Ok(cal)
}
