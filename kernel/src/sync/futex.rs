//! Fast userspace mutex primitive: `FUTEX_WAIT`/`FUTEX_WAKE` on a
//! userspace address, backed by a per-process map of address -> wait
//! queue.
//!
//! Grounded on original_source `futex.h`/`sync/futex.c`: a `futex_ctx_t`
//! (hashmap of address to `futex_t { queue }`) owned by each process,
//! looked up and lazily created by `futex_ctx_get`, with `FUTEX_WAIT`
//! re-checking the userspace value under the wait queue's lock before
//! blocking (so a `FUTEX_WAKE` racing the check is never missed) and
//! `FUTEX_WAKE` calling `wait_unblock` for up to `val` waiters.

use alloc::collections::BTreeMap;

use crate::{
    error::{KernelError, KernelResult},
    sync::{
        lock::Lock,
        wait::{Blocker, WaitQueue, WaitResult},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutexOp {
    Wait,
    Wake,
}

/// Per-process table of userspace futex addresses to wait queues.
/// Map entries are created lazily and never removed (matching the
/// source's map, which is torn down wholesale at process exit via
/// `futex_ctx_deinit`, not entry-by-entry).
pub struct FutexContext {
    futexes: Lock<BTreeMap<u64, WaitQueue>>,
}

impl Default for FutexContext {
    fn default() -> Self {
        Self::new()
    }
}

impl FutexContext {
    pub const fn new() -> Self {
        Self {
            futexes: Lock::new(BTreeMap::new()),
        }
    }

    /// Performs `op` on the futex at `addr`.
    ///
    /// `read_current` re-reads the live value at `addr` from userspace;
    /// it is re-invoked after linking onto the wait queue but before
    /// actually blocking, exactly where the source calls
    /// `thread_load_atomic_from_user` between `wait_block_setup` and
    /// `wait_block_commit`, so a concurrent `FUTEX_WAKE` between the
    /// caller's initial check and this call is never lost.
    ///
    /// Returns the number of waiters woken for `FUTEX_WAKE`, or `0` for
    /// a successful `FUTEX_WAIT` (whether it actually blocked or
    /// short-circuited because `read_current()` no longer equals
    /// `expected`).
    pub fn do_futex(
        &self,
        addr: u64,
        expected_or_count: u64,
        op: FutexOp,
        timeout_ns: Option<u64>,
        read_current: impl Fn() -> KernelResult<u64>,
    ) -> KernelResult<u64> {
        match op {
            FutexOp::Wait => self.wait(addr, expected_or_count, timeout_ns, read_current),
            FutexOp::Wake => Ok(self.wake(addr, expected_or_count)),
        }
    }

    fn wait(
        &self,
        addr: u64,
        expected: u64,
        timeout_ns: Option<u64>,
        read_current: impl Fn() -> KernelResult<u64>,
    ) -> KernelResult<u64> {
        let blocker = Blocker::current();
        loop {
            // Re-check under "about to block" conditions: link onto the
            // queue first, then verify the value, so a wake that lands
            // between the check and the block is observed via the wait
            // result rather than raced.
            let woke = {
                let mut table = self.futexes.acquire();
                let queue_ptr: *const WaitQueue = table.entry(addr).or_insert_with(WaitQueue::new);
                drop(table);
                // SAFETY: entries are never removed from `futexes`, so this
                // reference outlives the lock guard that produced it.
                let queue = unsafe { &*queue_ptr };

                if read_current()? != expected {
                    return Ok(0);
                }

                blocker.wait(queue, timeout_ns)
            };

            match woke {
                WaitResult::Norm => return Ok(0),
                WaitResult::Timeout => {
                    return Err(KernelError::Timeout {
                        operation: "futex_wait",
                        duration_ms: 0,
                    })
                }
                WaitResult::NotePending => return Err(KernelError::NotePending),
                WaitResult::Error => return Err(KernelError::Fatal("futex wait interrupted")),
            }
        }
    }

    fn wake(&self, addr: u64, count: u64) -> u64 {
        let mut table = self.futexes.acquire();
        let queue_ptr: *const WaitQueue = table.entry(addr).or_insert_with(WaitQueue::new);
        drop(table);
        // SAFETY: see `wait` above.
        let queue = unsafe { &*queue_ptr };
        queue.unblock(count, WaitResult::Norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU64, Ordering};

    #[test_case]
    fn test_wake_with_no_waiters_is_noop() {
        let ctx = FutexContext::new();
        let woken = ctx.wake(0x1000, 1);
        assert_eq!(woken, 0);
    }

    #[test_case]
    fn test_wait_short_circuits_on_value_mismatch() {
        let ctx = FutexContext::new();
        let value = AtomicU64::new(5);
        let result = ctx.do_futex(0x2000, 99, FutexOp::Wait, None, || {
            Ok(value.load(Ordering::Relaxed))
        });
        assert_eq!(result.unwrap(), 0);
    }
}
