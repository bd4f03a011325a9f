use std::io;

use crate::error::Error;

/// Pins the calling thread to exactly one logical cpu.
#[cfg(target_os = "linux")]
pub fn pin_current_thread(cpu: usize) -> Result<(), Error> {
    if cpu >= libc::CPU_SETSIZE as usize {
        return Err(Error::Affinity {
            cpu,
            source: io::Error::from_raw_os_error(libc::EINVAL),
        });
    }

    // SAFETY: cpu_set_t is plain data; CPU_SET is bounds-checked above.
    let ret = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };

    if ret != 0 {
        return Err(Error::Affinity {
            cpu,
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(cpu: usize) -> Result<(), Error> {
    Err(Error::Affinity {
        cpu,
        source: io::Error::new(
            io::ErrorKind::Unsupported,
            "cpu affinity is only supported on Linux",
        ),
    })
}

/// Cpus the calling thread is currently allowed to run on.
#[cfg(target_os = "linux")]
pub fn allowed_cpus() -> Result<Vec<usize>, Error> {
    // SAFETY: cpu_set_t is plain data filled in by the kernel.
    let (ret, set) = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        let ret = libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set);
        (ret, set)
    };
    if ret != 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok((0..libc::CPU_SETSIZE as usize)
        .filter(|&cpu| unsafe { libc::CPU_ISSET(cpu, &set) })
        .collect())
}

#[cfg(not(target_os = "linux"))]
pub fn allowed_cpus() -> Result<Vec<usize>, Error> {
    Ok(Vec::new())
}

/// Cpu the calling thread is currently running on, if the platform reports it.
#[cfg(target_os = "linux")]
pub fn current_cpu() -> Option<usize> {
    let cpu = unsafe { libc::sched_getcpu() };
    usize::try_from(cpu).ok()
}

#[cfg(not(target_os = "linux"))]
pub fn current_cpu() -> Option<usize> {
    None
}
