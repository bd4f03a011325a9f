use std::time::Duration;

use super::calibrate::Calibration;
use super::clock::Clock;
use super::shape::LoadShape;

/// What one duty-cycle loop did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DutyReport {
    /// Sample window boundaries crossed.
    pub windows: u64,
    /// Idle time requested across all windows.
    pub idle_us: u64,
    /// Ticks from loop start to exit.
    pub elapsed_ticks: u64,
}

impl DutyReport {
    /// Share of the run spent busy, going by requested idle time.
    pub fn busy_ratio(&self, cal: &Calibration) -> f64 {
        if self.elapsed_ticks == 0 {
            return 0.0;
        }
        let idle_ticks = cal.us_to_ticks(self.idle_us).min(self.elapsed_ticks);
        1.0 - idle_ticks as f64 / self.elapsed_ticks as f64
    }
}

/// Spins on the counter until `cycles_per_timeout` ticks have elapsed,
/// sleeping at each sample window boundary for as long as `shape` asks.
///
/// Boundaries are a running threshold advanced by `cycles_per_sample`, so
/// late wakeups do not shift later windows. The loop is open: achieved
/// utilization is never measured or corrected.
pub fn run_duty_cycle<C: Clock>(clock: &C, cal: &Calibration, shape: &LoadShape) -> DutyReport {
    let mut report = DutyReport::default();

    let begin = clock.ticks();
    let end = begin.saturating_add(cal.cycles_per_timeout);
    let mut threshold = begin.saturating_add(cal.cycles_per_sample);
    let mut now = begin;

    while now < end {
        now = clock.ticks();
        if now > threshold {
            let idle_us = shape.idle_us(now - begin, cal);
            log::trace!(
                target: "cpuload::worker",
                "window {}: idle {}us",
                report.windows,
                idle_us,
            );
            if idle_us > 0 {
                clock.sleep(Duration::from_micros(idle_us));
            }
            report.windows += 1;
            report.idle_us = report.idle_us.saturating_add(idle_us);
            threshold = threshold.saturating_add(cal.cycles_per_sample);
        }
    }

    report.elapsed_ticks = now - begin;
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoadMode, RunConfig};
    use crate::load::calibrate::calibrate;
    use crate::load::clock::fake::FakeClock;
    use crate::load::clock::Monotonic;

    // One tick per microsecond, ten ticks per counter read.
    fn fake_run(cfg: &RunConfig) -> (FakeClock, Calibration, DutyReport) {
        let clock = FakeClock::new(0, 10, 1);
        let cal = calibrate(&clock, 0, cfg).unwrap();
        let report = run_duty_cycle(&clock, &cal, &LoadShape::from_config(cfg));
        (clock, cal, report)
    }

    #[test]
    fn test_constant_load_alternates_busy_and_idle() {
        let cfg = RunConfig {
            busy_pct: 40,
            timeout_secs: 1,
            ..Default::default()
        };
        let (clock, cal, report) = fake_run(&cfg);
        assert_eq!(cal.cycles_per_sample, 10_010);

        let sleeps = clock.sleeps.borrow();
        // First entry is the calibration sleep.
        assert_eq!(sleeps[0], Duration::from_millis(10));
        assert!(sleeps[1..].iter().all(|d| *d == Duration::from_micros(6_000)));
        assert_eq!(sleeps.len() as u64 - 1, report.windows);
        assert!((98..=101).contains(&report.windows), "windows {}", report.windows);
        assert!((report.busy_ratio(&cal) - 0.4).abs() < 0.02);
    }

    #[test]
    fn test_loop_terminates_within_one_window_of_timeout() {
        for busy_pct in [0, 25, 100] {
            let cfg = RunConfig {
                busy_pct,
                timeout_secs: 1,
                ..Default::default()
            };
            let (_, cal, report) = fake_run(&cfg);
            assert!(report.elapsed_ticks >= cal.cycles_per_timeout);
            assert!(
                report.elapsed_ticks <= cal.cycles_per_timeout + cal.cycles_per_sample + 10,
                "busy {}: overran by {} ticks",
                busy_pct,
                report.elapsed_ticks - cal.cycles_per_timeout
            );
        }
    }

    #[test]
    fn test_full_busy_never_sleeps() {
        let cfg = RunConfig {
            timeout_secs: 1,
            ..Default::default()
        };
        let (clock, _, report) = fake_run(&cfg);
        assert_eq!(clock.sleeps.borrow().len(), 1);
        assert_eq!(report.idle_us, 0);
        assert!(report.windows >= 98);
    }

    #[test]
    fn test_wave_load_sleeps_vary_within_window() {
        let cfg = RunConfig {
            mode: LoadMode::Wave,
            timeout_secs: 2,
            period_secs: 1,
            ..Default::default()
        };
        let (clock, _, report) = fake_run(&cfg);
        let sleeps = clock.sleeps.borrow();
        let idle: Vec<u128> = sleeps[1..].iter().map(|d| d.as_micros()).collect();
        assert!(idle.iter().all(|&us| us <= 10_000));
        let min = idle.iter().min().copied().unwrap_or(0);
        let max = idle.iter().max().copied().unwrap_or(0);
        assert!(max - min > 5_000, "min {} max {}", min, max);
        assert!(report.windows > 0);
    }

    #[test]
    fn test_real_clock_run_is_bounded() {
        let cfg = RunConfig {
            busy_pct: 50,
            sample_ms: 5,
            timeout_secs: 1,
            ..Default::default()
        };
        let clock = Monotonic;
        let cal = calibrate(&clock, 0, &cfg).unwrap();
        let start = std::time::Instant::now();
        let report = run_duty_cycle(&clock, &cal, &LoadShape::from_config(&cfg));
        let wall = start.elapsed();
        assert!(report.windows > 0);
        assert!(wall >= Duration::from_millis(500));
        assert!(wall < Duration::from_secs(3), "ran for {:?}", wall);
    }
}
