use std::io::{self, Write};
use std::sync::Arc;

use crate::cli::CalibrateArgs;
use crate::config::RunConfig;
use crate::error::Error;
use crate::load::calibrate;
use crate::load::clock::{Clock, SystemClock};
use crate::orchestrator;

/// Repeated cycles-per-sample measurements for one cpu.
pub struct CalibrationStats {
    pub cpu: usize,
    pub samples: Vec<u64>,
}

impl CalibrationStats {
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|&s| s as f64).sum::<f64>() / self.samples.len() as f64
    }

    pub fn min(&self) -> u64 {
        self.samples.iter().copied().min().unwrap_or(0)
    }

    pub fn max(&self) -> u64 {
        self.samples.iter().copied().max().unwrap_or(0)
    }

    /// (max - min) / mean, as a percentage.
    pub fn spread_pct(&self) -> f64 {
        let mean = self.mean();
        if mean < f64::EPSILON {
            return 0.0;
        }
        100.0 * (self.max() - self.min()) as f64 / mean
    }

    /// Sample standard deviation.
    pub fn std_dev(&self) -> f64 {
        let n = self.samples.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let var = self
            .samples
            .iter()
            .map(|&s| {
                let d = s as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / (n - 1) as f64;
        var.sqrt()
    }

    /// Implied counter frequency in MHz for a window of `sample_ms`.
    pub fn mhz(&self, sample_ms: u64) -> f64 {
        if sample_ms == 0 {
            return 0.0;
        }
        self.mean() / (sample_ms as f64 * 1000.0)
    }
}

fn calibrate_rounds<C: Clock>(
    clock: &C,
    cpu: usize,
    cfg: &RunConfig,
    rounds: u32,
) -> Result<Vec<u64>, Error> {
    (0..rounds)
        .map(|_| calibrate::calibrate(clock, cpu, cfg).map(|cal| cal.cycles_per_sample))
        .collect()
}

fn write_report(
    out: &mut dyn Write,
    stats: &[CalibrationStats],
    sample_ms: u64,
    counter: &str,
) -> io::Result<()> {
    writeln!(out, "--- Calibration ({} counter, {} ms windows) ---", counter, sample_ms)?;
    writeln!(
        out,
        "{:<5} {:>14} {:>14} {:>14} {:>9} {:>10}",
        "Cpu", "Mean", "Min", "Max", "Spread", "MHz"
    )?;
    for stat in stats {
        writeln!(
            out,
            "{:<5} {:>14.0} {:>14} {:>14} {:>8.2}% {:>10.1}",
            stat.cpu,
            stat.mean(),
            stat.min(),
            stat.max(),
            stat.spread_pct(),
            stat.mhz(sample_ms)
        )?;
    }

    if stats.len() > 1 {
        let widest = stats.iter().max_by(|a, b| {
            a.spread_pct()
                .partial_cmp(&b.spread_pct())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if let Some(stat) = widest {
            writeln!(
                out,
                "Least stable: cpu {} ({:.2}% spread, sd {:.0} ticks)",
                stat.cpu,
                stat.spread_pct(),
                stat.std_dev()
            )?;
        }
    }
    Ok(())
}

/// Calibrates each requested cpu `args.rounds` times and prints how much the
/// measurements move between rounds.
pub fn run(
    args: &CalibrateArgs,
    config: Arc<RunConfig>,
    online: usize,
) -> Result<Vec<CalibrationStats>, Error> {
    orchestrator::check_cpu_range(config.start_cpu, config.count, online)?;

    let clock = SystemClock::detect();
    let rounds = args.rounds;
    let mut handles = Vec::with_capacity(config.count);
    for cpu in config.cpus() {
        let cfg = Arc::clone(&config);
        let handle = orchestrator::spawn_pinned(cpu, move || {
            let samples = calibrate_rounds(&clock, cpu, &cfg, rounds)?;
            Ok(CalibrationStats { cpu, samples })
        })?;
        handles.push((cpu, handle));
    }

    let stats = orchestrator::join_all(handles)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_report(&mut out, &stats, config.sample_ms, clock.name())?;
    out.flush()?;

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::clock::fake::FakeClock;

    fn stats(samples: &[u64]) -> CalibrationStats {
        CalibrationStats {
            cpu: 1,
            samples: samples.to_vec(),
        }
    }

    #[test]
    fn test_summary_numbers() {
        let s = stats(&[900, 1000, 1100]);
        assert!((s.mean() - 1000.0).abs() < 1e-9);
        assert_eq!(s.min(), 900);
        assert_eq!(s.max(), 1100);
        assert!((s.spread_pct() - 20.0).abs() < 1e-9);
        assert!((s.std_dev() - 100.0).abs() < 1e-9);
        assert!((s.mhz(1) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_and_single_sample() {
        let empty = stats(&[]);
        assert_eq!(empty.mean(), 0.0);
        assert_eq!(empty.spread_pct(), 0.0);
        assert_eq!(stats(&[5]).std_dev(), 0.0);
    }

    #[test]
    fn test_rounds_with_fake_clock_are_identical() {
        let clock = FakeClock::new(0, 0, 2_000);
        let samples = calibrate_rounds(&clock, 0, &RunConfig::default(), 4).unwrap();
        assert_eq!(samples, vec![20_000_000; 4]);
        assert_eq!(stats(&samples).spread_pct(), 0.0);
    }

    #[test]
    fn test_write_report_table() {
        let all = vec![
            stats(&[900, 1000, 1100]),
            CalibrationStats {
                cpu: 2,
                samples: vec![1000, 1000],
            },
        ];
        let mut buf = Vec::new();
        write_report(&mut buf, &all, 10, "tsc").unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("--- Calibration (tsc counter, 10 ms windows) ---"));
        assert!(text.contains("20.00%"));
        assert!(text.contains("Least stable: cpu 1"));
    }

    #[test]
    fn test_run_rejects_bad_range() {
        let args = CalibrateArgs {
            start: 8,
            count: 1,
            sample: None,
            rounds: 1,
            config_file: None,
            log: crate::logging::LogArgs {
                log_level: None,
                log_file: None,
                syslog: false,
            },
        };
        let config = Arc::new(RunConfig {
            start_cpu: 8,
            ..Default::default()
        });
        assert!(run(&args, config, 4).is_err());
    }
}
