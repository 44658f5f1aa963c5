//! Time-related system calls: nanosleep, uptime, unix epoch, errno.

use super::{SyscallError, SyscallResult};
use crate::sync::wait::{Blocker, WaitQueue};

/// Put the calling thread to sleep for a relative duration.
///
/// # Arguments
/// - `seconds`: whole seconds to sleep
/// - `nanos`: additional nanoseconds (0..1_000_000_000)
/// - `remaining_ptr`: unused; reserved for an unslept-remainder readback
/// - `_unused`: reserved
pub fn sys_nanosleep(
    seconds: usize,
    nanos: usize,
    remaining_ptr: usize,
    _unused: usize,
) -> SyscallResult {
    if nanos >= 1_000_000_000 {
        return Err(SyscallError::InvalidArgument);
    }

    let timeout_ns = (seconds as u64)
        .saturating_mul(1_000_000_000)
        .saturating_add(nanos as u64);

    if timeout_ns == 0 {
        crate::sched::yield_cpu();
        return Ok(0);
    }

    // A sleep has no wake queue of its own; it parks on a throwaway queue
    // and relies entirely on the registered deadline to wake it.
    let queue = WaitQueue::new();
    Blocker::current().wait(&queue, Some(timeout_ns));

    if remaining_ptr != 0 {
        unsafe { super::userspace::copy_to_user(remaining_ptr, &0u64)? };
    }

    Ok(0)
}

/// Time since boot, in nanoseconds.
pub fn sys_uptime(_a: usize, _b: usize, _c: usize, _d: usize, _e: usize) -> SyscallResult {
    Ok(crate::timer::uptime() as usize)
}

/// Seconds since the Unix epoch, read from the real-time clock.
pub fn sys_unix_epoch(_a: usize, _b: usize, _c: usize, _d: usize, _e: usize) -> SyscallResult {
    #[cfg(target_arch = "x86_64")]
    {
        Ok(crate::arch::x86_64::rtc::current_epoch_secs() as usize)
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        Err(SyscallError::InvalidSyscall)
    }
}

/// The calling thread's last recorded errno.
pub fn sys_errno(_a: usize, _b: usize, _c: usize, _d: usize, _e: usize) -> SyscallResult {
    let thread = crate::process::current_thread().ok_or(SyscallError::InvalidState)?;
    Ok(thread.get_errno() as usize)
}
