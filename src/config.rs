use std::io;
use std::path::Path;

use serde::Deserialize;

use crate::error::Error;

/// Load shape selected for every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Fixed busy percentage, y = ax.
    Constant,
    /// Busy fraction follows y = 0.5sin(ax) + 0.5.
    Wave,
}

impl LoadMode {
    /// Maps the numeric `--mode` code to a load mode.
    pub fn from_code(code: u32) -> Result<Self, Error> {
        match code {
            1 => Ok(LoadMode::Constant),
            2 => Ok(LoadMode::Wave),
            other => Err(Error::InvalidArgs(format!(
                "work load mode {} not supported (1 = constant, 2 = wave)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Only settable from the command line.
    #[serde(skip)]
    pub start_cpu: usize,
    pub count: usize,
    pub sample_ms: u64,
    pub timeout_secs: u64,
    pub busy_pct: u32,
    pub period_secs: u64,
    pub mode: LoadMode,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            start_cpu: 0,
            count: 1,
            sample_ms: 10,
            timeout_secs: 10,
            busy_pct: 100,
            period_secs: 5,
            mode: LoadMode::Constant,
        }
    }
}

impl RunConfig {
    /// Rejects values that would make the timing arithmetic degenerate.
    pub fn validate(&self) -> Result<(), Error> {
        if self.sample_ms == 0 {
            return Err(Error::InvalidArgs("sample length must be greater than 0 ms".into()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::InvalidArgs("timeout must be greater than 0 seconds".into()));
        }
        if self.busy_pct > 100 {
            return Err(Error::InvalidArgs(format!(
                "busy percentage {} out of range 0-100",
                self.busy_pct
            )));
        }
        if self.mode == LoadMode::Wave && self.period_secs == 0 {
            return Err(Error::InvalidArgs(
                "wave period must be greater than 0 seconds".into(),
            ));
        }
        if self.count == 0 {
            return Err(Error::InvalidArgs("worker count must be greater than 0".into()));
        }
        Ok(())
    }

    /// Sample window length in microseconds.
    pub fn window_us(&self) -> u64 {
        self.sample_ms.saturating_mul(1000)
    }

    /// Logical cores targeted by this run, in spawn order.
    pub fn cpus(&self) -> std::ops::Range<usize> {
        self.start_cpu..self.start_cpu.saturating_add(self.count)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub load: RunConfig,
}

pub const DEFAULT_CONFIG_PATH: &str = "/etc/cpuload.toml";

/// Reads the `[load]` table from a TOML file.
///
/// An explicit path must exist. Without one, `/etc/cpuload.toml` is used when
/// present and built-in defaults otherwise.
pub fn load_config(explicit_path: Option<&Path>) -> Result<Config, Error> {
    let path = explicit_path.unwrap_or(Path::new(DEFAULT_CONFIG_PATH));

    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound && explicit_path.is_none() => {
            return Ok(Config::default());
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::InvalidArgs(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        Err(e) => {
            return Err(Error::InvalidArgs(format!(
                "failed to read config {}: {}",
                path.display(),
                e
            )));
        }
    };

    let config: Config = toml::from_str(&contents).map_err(|e| {
        Error::InvalidArgs(format!("failed to parse config {}: {}", path.display(), e))
    })?;
    log::debug!("loaded config from {}", path.display());

    Ok(config)
}
