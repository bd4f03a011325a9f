use std::f64::consts::PI;

use crate::config::{LoadMode, RunConfig};

use super::calibrate::Calibration;

/// How much of each sample window a worker spends asleep.
///
/// Resolved from the configuration once, before any worker starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadShape {
    /// y = ax: a stationary busy percentage.
    Constant { window_us: u64, busy_pct: u32 },
    /// y = 0.5sin(ax) + 0.5: busy fraction sweeps 0-100% once per wave period.
    Wave { window_us: u64 },
}

impl LoadShape {
    pub fn from_config(cfg: &RunConfig) -> Self {
        let window_us = cfg.window_us();
        match cfg.mode {
            LoadMode::Constant => LoadShape::Constant {
                window_us,
                busy_pct: cfg.busy_pct,
            },
            LoadMode::Wave => LoadShape::Wave { window_us },
        }
    }

    /// Microseconds of idle time to insert in the window ending at `elapsed`
    /// ticks since the loop started.
    pub fn idle_us(&self, elapsed: u64, cal: &Calibration) -> u64 {
        match *self {
            LoadShape::Constant {
                window_us,
                busy_pct,
            } => window_us.saturating_sub(window_us * u64::from(busy_pct) / 100),
            LoadShape::Wave { window_us } => {
                let busy = wave_busy_fraction(elapsed, cal.cycles_per_period);
                let idle = window_us as f64 * (1.0 - busy);
                (idle as u64).min(window_us)
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            LoadShape::Constant { busy_pct, .. } => format!("constant {}% busy", busy_pct),
            LoadShape::Wave { .. } => "wave 0-100% busy".to_string(),
        }
    }
}

/// 0.5sin(2π·elapsed/period) + 0.5, with the phase reduced modulo one period.
fn wave_busy_fraction(elapsed: u64, period: u64) -> f64 {
    if period == 0 {
        return 1.0;
    }
    let phase = (elapsed % period) as f64 / period as f64;
    (0.5 * (2.0 * PI * phase).sin() + 0.5).clamp(0.0, 1.0)
}
