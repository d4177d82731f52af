//! Process and system resource probes used by the monitor and the memory
//! budget knob.
//!
//! Every probe is best-effort: `None` means "this platform cannot tell",
//! and callers fall back to cheap heuristics.

use std::time::Duration;

/// Installed physical memory in bytes.
#[must_use]
pub fn total_system_memory() -> Option<u64> {
    #[cfg(unix)]
    {
        let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) };
        if pages <= 0 || page_size <= 0 {
            return None;
        }
        #[allow(clippy::cast_sign_loss)]
        Some(pages as u64 * page_size as u64)
    }
    #[cfg(windows)]
    {
        use windows::Win32::System::SystemInformation::{GlobalMemoryStatusEx, MEMORYSTATUSEX};

        let mut status = MEMORYSTATUSEX {
            dwLength: u32::try_from(std::mem::size_of::<MEMORYSTATUSEX>()).ok()?,
            ..Default::default()
        };
        unsafe { GlobalMemoryStatusEx(&mut status) }.ok()?;
        Some(status.ullTotalPhys)
    }
}

/// Resident set size of this process in bytes.
#[must_use]
pub fn process_rss_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) };
        if page_size <= 0 {
            return None;
        }
        #[allow(clippy::cast_sign_loss)]
        Some(resident_pages * page_size as u64)
    }
    #[cfg(windows)]
    {
        use windows::Win32::System::ProcessStatus::{
            GetProcessMemoryInfo, PROCESS_MEMORY_COUNTERS,
        };
        use windows::Win32::System::Threading::GetCurrentProcess;

        let mut counters = PROCESS_MEMORY_COUNTERS::default();
        unsafe {
            GetProcessMemoryInfo(
                GetCurrentProcess(),
                &mut counters,
                u32::try_from(std::mem::size_of::<PROCESS_MEMORY_COUNTERS>()).ok()?,
            )
        }
        .ok()?;
        Some(counters.WorkingSetSize as u64)
    }
    #[cfg(all(unix, not(target_os = "linux")))]
    {
        None
    }
}

/// Cumulative user + system CPU time consumed by this process.
#[must_use]
pub fn process_cpu_time() -> Option<Duration> {
    #[cfg(unix)]
    {
        let mut usage = std::mem::MaybeUninit::<libc::rusage>::uninit();
        let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
        if rc != 0 {
            return None;
        }
        let usage = unsafe { usage.assume_init() };
        Some(timeval_to_duration(usage.ru_utime) + timeval_to_duration(usage.ru_stime))
    }
    #[cfg(windows)]
    {
        use windows::Win32::Foundation::FILETIME;
        use windows::Win32::System::Threading::{GetCurrentProcess, GetProcessTimes};

        let mut creation = FILETIME::default();
        let mut exit = FILETIME::default();
        let mut kernel = FILETIME::default();
        let mut user = FILETIME::default();
        unsafe {
            GetProcessTimes(
                GetCurrentProcess(),
                &mut creation,
                &mut exit,
                &mut kernel,
                &mut user,
            )
        }
        .ok()?;
        Some(filetime_to_duration(kernel) + filetime_to_duration(user))
    }
}

/// Cumulative (read, write) operation counts for this process.
///
/// Windows reads the kernel's per-process I/O counters; Linux parses
/// `/proc/self/io`. Elsewhere unavailable.
#[must_use]
pub fn process_io_ops() -> Option<(u64, u64)> {
    #[cfg(windows)]
    {
        use windows::Win32::System::Threading::{
            GetCurrentProcess, GetProcessIoCounters, IO_COUNTERS,
        };

        let mut counters = IO_COUNTERS::default();
        unsafe { GetProcessIoCounters(GetCurrentProcess(), &mut counters) }.ok()?;
        Some((counters.ReadOperationCount, counters.WriteOperationCount))
    }
    #[cfg(target_os = "linux")]
    {
        let raw = std::fs::read_to_string("/proc/self/io").ok()?;
        let mut reads = None;
        let mut writes = None;
        for line in raw.lines() {
            if let Some(value) = line.strip_prefix("syscr:") {
                reads = value.trim().parse().ok();
            } else if let Some(value) = line.strip_prefix("syscw:") {
                writes = value.trim().parse().ok();
            }
        }
        Some((reads?, writes?))
    }
    #[cfg(all(unix, not(target_os = "linux")))]
    {
        None
    }
}

/// Logical CPU count, never zero.
#[must_use]
pub fn logical_cpus() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

#[cfg(unix)]
fn timeval_to_duration(tv: libc::timeval) -> Duration {
    #[allow(clippy::cast_sign_loss)]
    Duration::new(tv.tv_sec.max(0) as u64, (tv.tv_usec.max(0) as u32) * 1000)
}

#[cfg(windows)]
fn filetime_to_duration(ft: windows::Win32::Foundation::FILETIME) -> Duration {
    let ticks = (u64::from(ft.dwHighDateTime) << 32) | u64::from(ft.dwLowDateTime);
    Duration::from_nanos(ticks.saturating_mul(100))
}
