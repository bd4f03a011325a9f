use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::affinity;
use crate::config::RunConfig;
use crate::error::Error;
use crate::load::clock::{Clock, SystemClock};
use crate::load::shape::LoadShape;
use crate::load::{Worker, WorkerReport};

/// Grace period for the scheduler to dispatch freshly spawned workers.
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Checks that `count` cpus starting at `start` all lie in `[0, online)`.
pub fn check_cpu_range(start: usize, count: usize, online: usize) -> Result<(), Error> {
    let end = start.checked_add(count);
    let valid =
        start < online && count > 0 && count <= online && end.is_some_and(|e| e <= online);

    if !valid {
        return Err(Error::InvalidArgs(format!(
            "cpu range invalid: start {} count {} with {} cpus online (0-{})",
            start,
            count,
            online,
            online.saturating_sub(1)
        )));
    }
    Ok(())
}

/// Spawns a thread that pins itself to `cpu` and then runs `f`.
///
/// Returns only after the thread has reported whether pinning succeeded,
/// so `f` never runs on the wrong cpu.
pub fn spawn_pinned<T, F>(cpu: usize, f: F) -> Result<JoinHandle<Result<T, Error>>, Error>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, Error> + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Result<(), Error>>();

    let handle = thread::Builder::new()
        .name(format!("cpuload-{}", cpu))
        .spawn(move || match affinity::pin_current_thread(cpu) {
            Ok(()) => {
                let _ = tx.send(Ok(()));
                log::debug!(
                    target: "cpuload::worker",
                    "pinned to cpu {}, running on {:?}",
                    cpu,
                    affinity::current_cpu(),
                );
                f()
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                Err(Error::Thread(format!("worker for cpu {} was never pinned", cpu)))
            }
        })
        .map_err(|e| Error::Thread(format!("failed to spawn worker for cpu {}: {}", cpu, e)))?;

    match rx.recv() {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(e)
        }
        Err(_) => Err(Error::Thread(format!(
            "worker for cpu {} exited before reporting its affinity",
            cpu
        ))),
    }
}

/// Joins every worker in order, stopping at the first failure.
pub fn join_all<T>(
    handles: Vec<(usize, JoinHandle<Result<T, Error>>)>,
) -> Result<Vec<T>, Error> {
    let mut results = Vec::with_capacity(handles.len());
    for (cpu, handle) in handles {
        let result = handle
            .join()
            .map_err(|_| Error::Thread(format!("worker for cpu {} panicked", cpu)))??;
        results.push(result);
    }
    Ok(results)
}

fn warn_unschedulable(config: &RunConfig) {
    match affinity::allowed_cpus() {
        Ok(allowed) if !allowed.is_empty() => {
            for cpu in config.cpus().filter(|cpu| !allowed.contains(cpu)) {
                log::warn!("cpu {} is outside this process's affinity mask", cpu);
            }
        }
        Ok(_) => {}
        Err(e) => log::debug!("could not read affinity mask: {}", e),
    }
}

fn log_summary(report: &WorkerReport) {
    log::info!(
        "cpu {}: {} windows, {:.1}% busy, {:.0} MHz counter",
        report.cpu,
        report.duty.windows,
        100.0 * report.duty.busy_ratio(&report.calibration),
        report.calibration.ticks_per_us(),
    );
}

/// Runs one pinned worker per requested cpu and waits for all of them.
///
/// Nothing is spawned unless the cpu range fits in `online`. A worker that
/// fails to pin aborts the run; workers already started are left running.
pub fn run(config: Arc<RunConfig>, online: usize) -> Result<Vec<WorkerReport>, Error> {
    check_cpu_range(config.start_cpu, config.count, online)?;
    warn_unschedulable(&config);

    let shape = LoadShape::from_config(&config);
    let clock = SystemClock::detect();
    log::debug!(
        "{} workers on cpus {}-{}, {} ms windows, {}, {} counter",
        config.count,
        config.start_cpu,
        config.start_cpu + config.count - 1,
        config.sample_ms,
        shape.describe(),
        clock.name(),
    );

    let mut handles = Vec::with_capacity(config.count);
    for cpu in config.cpus() {
        let worker_config = Arc::clone(&config);
        let handle = spawn_pinned(cpu, move || {
            Worker::new(cpu, clock, worker_config, shape).run()
        })?;
        handles.push((cpu, handle));
    }

    thread::sleep(SETTLE_DELAY);

    let reports = join_all(handles)?;
    for report in &reports {
        log_summary(report);
    }
    log::info!("done");
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_accepts_exact_fit() {
        assert!(check_cpu_range(0, 4, 4).is_ok());
        assert!(check_cpu_range(3, 1, 4).is_ok());
        assert!(check_cpu_range(2, 1, 8).is_ok());
    }

    #[test]
    fn test_range_rejects_overflowing_end() {
        let err = check_cpu_range(3, 2, 4).unwrap_err();
        assert!(format!("{}", err).contains("cpu range invalid"));
    }

    #[test]
    fn test_range_rejects_bad_start_and_count() {
        assert!(check_cpu_range(4, 1, 4).is_err());
        assert!(check_cpu_range(0, 0, 4).is_err());
        assert!(check_cpu_range(0, 5, 4).is_err());
        assert!(check_cpu_range(1, usize::MAX, 4).is_err());
        assert!(check_cpu_range(0, 1, 0).is_err());
    }

    #[test]
    fn test_run_rejects_range_before_spawning() {
        let config = Arc::new(RunConfig {
            start_cpu: 3,
            count: 2,
            ..Default::default()
        });
        let started = std::time::Instant::now();
        assert!(run(config, 4).is_err());
        // No settle delay means no threads were started.
        assert!(started.elapsed() < SETTLE_DELAY);
    }

    #[test]
    fn test_join_all_reports_worker_errors() {
        let handles = vec![
            (0, thread::spawn(|| Ok::<u32, Error>(1))),
            (1, thread::spawn(|| Err::<u32, Error>(Error::Thread("boom".into())))),
        ];
        let err = join_all(handles).unwrap_err();
        assert!(format!("{}", err).contains("boom"));
    }

    #[test]
    fn test_join_all_tolerates_finished_workers() {
        let handle = thread::spawn(|| Ok::<u32, Error>(7));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(join_all(vec![(0, handle)]).unwrap(), vec![7]);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_spawn_pinned_runs_on_target_cpu() {
        let cpu = affinity::allowed_cpus().unwrap()[0];
        let handle = spawn_pinned(cpu, || Ok(affinity::current_cpu())).unwrap();
        assert_eq!(join_all(vec![(cpu, handle)]).unwrap(), vec![Some(cpu)]);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_spawn_pinned_surfaces_affinity_error() {
        let cpu = libc::CPU_SETSIZE as usize;
        match spawn_pinned(cpu, || Ok(())) {
            Err(Error::Affinity { cpu: failed, .. }) => assert_eq!(failed, cpu),
            Err(other) => panic!("expected affinity error, got {}", other),
            Ok(_) => panic!("expected affinity error"),
        }
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_run_one_worker_constant_load() {
        let cpu = affinity::allowed_cpus().unwrap()[0];
        let config = Arc::new(RunConfig {
            start_cpu: cpu,
            count: 1,
            busy_pct: 40,
            sample_ms: 10,
            timeout_secs: 1,
            ..Default::default()
        });
        let started = std::time::Instant::now();
        let reports = run(config, cpu + 1).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].cpu, cpu);
        assert!(reports[0].duty.windows > 50);
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
