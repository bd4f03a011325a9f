use std::fs;

use crate::error::Error;

const PROC_STAT: &str = "/proc/stat";

/// Counts the per-cpu `cpuN` rows of a /proc/stat dump.
///
/// The aggregate `cpu` row must come first; per-cpu rows follow it
/// contiguously and counting stops at the first row that is not one.
pub fn count_cpu_rows(stat: &str) -> Result<usize, Error> {
    let mut lines = stat.lines();

    match lines.next() {
        Some(first) if first.split_whitespace().next() == Some("cpu") => {}
        _ => {
            return Err(Error::Topology(format!(
                "failed to parse {} format",
                PROC_STAT
            )))
        }
    }

    let count = lines
        .take_while(|line| {
            line.split_whitespace()
                .next()
                .and_then(|tag| tag.strip_prefix("cpu"))
                .is_some_and(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
        })
        .count();

    Ok(count)
}

/// Number of online logical cpus, as listed in /proc/stat.
pub fn online_cpus() -> Result<usize, Error> {
    let stat = fs::read_to_string(PROC_STAT)
        .map_err(|e| Error::Topology(format!("open failed {}: {}", PROC_STAT, e)))?;

    let count = count_cpu_rows(&stat)?;
    if count == 0 {
        return Err(Error::Topology("get cpu online number failed".into()));
    }
    log::debug!("{} online cpus", count);
    Ok(count)
}
