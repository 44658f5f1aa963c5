//! Wait queues, blocking mutex, and RW mutex.
//!
//! Grounded in the original kernel's `sched/wait.h`, which is the
//! authoritative source for this design (preferred over this crate's prior
//! `sched::ipc_blocking`, whose single `WAIT_QUEUES` map was keyed by IPC
//! endpoint id and not reusable as a general embeddable primitive). A
//! [`WaitQueue`] is a lock-protected list of parked threads; each thread
//! may be linked into several queues simultaneously (e.g. `wait_block_many`
//! for futex/select-style multi-wait), and carries one [`WaitResult`]
//! describing why it was woken.
//!
//! The source's `WAIT_BLOCK[_LOCK][_TIMEOUT]` macro family -- a
//! condition-recheck-with-deadline loop -- becomes the [`Blocker`] object
//! here, per spec's section 9 redesign note: callers write an ordinary
//! loop whose body is their predicate and whose condition calls
//! `blocker.wait(queue, timeout)`, rather than invoking a macro.

use alloc::vec::Vec;

use crate::{
    config::CONFIG_MUTEX_MAX_SLOW_SPIN,
    error::{KernelError, KernelResult},
    sync::lock::Lock,
};

/// Thread identifier as seen by the wait/wake machinery. Opaque here;
/// `sched::scheduler` owns the authoritative `Thread`/`Task` types and maps
/// ids to them.
pub type ThreadId = u64;

/// Why a blocked thread was woken, mirroring `wait_result_t` in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// Woken normally by `unblock`.
    Norm,
    /// The registered deadline elapsed first.
    Timeout,
    /// A note (including a kill) arrived while blocked.
    NotePending,
    /// An error occurred while blocked (e.g. the queue was torn down).
    Error,
}

impl WaitResult {
    pub fn into_kernel_result(self) -> KernelResult<()> {
        match self {
            WaitResult::Norm => Ok(()),
            WaitResult::Timeout => Err(KernelError::Timeout {
                operation: "wait",
                duration_ms: 0,
            }),
            WaitResult::NotePending => Err(KernelError::NotePending),
            WaitResult::Error => Err(KernelError::Fatal("wait queue error")),
        }
    }
}

struct Entry {
    thread: ThreadId,
    result: WaitResult,
}

/// A lock-protected list of parked threads.
///
/// Intentionally simpler than the source's fully intrusive, O(1)-unlink
/// `wait_entry_t` lists threaded through both the queue and the thread's
/// own `wait_ctx`: this implementation keeps one `Vec<Entry>` per queue
/// behind a `Lock`, so unlinking a specific thread from a queue it gave up
/// on (timeout/note) is O(queue length) rather than O(1). This is recorded
/// as a deliberate simplification in DESIGN.md; the timeout/cancellation
/// semantics themselves are unchanged.
pub struct WaitQueue {
    entries: Lock<Vec<Entry>>,
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            entries: Lock::new(Vec::new()),
        }
    }

    /// Links `thread` onto this queue. Called by `Blocker::wait` while the
    /// caller's data lock is still held, per the source's blocking
    /// protocol (evaluate predicate -> link -> release data lock -> yield).
    fn park(&self, thread: ThreadId) {
        self.entries.acquire().push(Entry {
            thread,
            result: WaitResult::Norm,
        });
    }

    fn take_result(&self, thread: ThreadId) -> Option<WaitResult> {
        let mut guard = self.entries.acquire();
        let idx = guard.iter().position(|e| e.thread == thread)?;
        Some(guard.swap_remove(idx).result)
    }

    /// Wakes up to `n` parked threads with `result`, scheduling each back
    /// onto its owning CPU's runqueue. `n = u64::MAX` (`WAIT_ALL`) wakes
    /// every waiter.
    pub fn unblock(&self, n: u64, result: WaitResult) -> u64 {
        let mut guard = self.entries.acquire();
        let count = if n == u64::MAX {
            guard.len()
        } else {
            (n as usize).min(guard.len())
        };
        let woken: Vec<ThreadId> = guard.drain(0..count).map(|e| e.thread).collect();
        drop(guard);
        for tid in &woken {
            crate::sched::wake::wake_thread(*tid, result);
        }
        woken.len() as u64
    }

    /// Wakes every parked thread; shorthand for `unblock(u64::MAX, result)`.
    pub fn unblock_all(&self, result: WaitResult) -> u64 {
        self.unblock(u64::MAX, result)
    }
}

/// `unblock`'s "wake everyone" sentinel, named per spec.md/source parlance.
pub const WAIT_ALL: u64 = u64::MAX;

/// Implements the condition-recheck-loop-with-deadline pattern that the
/// source encodes as `WAIT_BLOCK[_LOCK][_TIMEOUT]` macros.
///
/// Usage mirrors the source's documented protocol:
/// ```ignore
/// let blocker = Blocker::current();
/// loop {
///     if predicate_holds() { break; }
///     blocker.wait(&queue, timeout)?;
/// }
/// ```
pub struct Blocker {
    thread: ThreadId,
}

impl Blocker {
    pub fn for_thread(thread: ThreadId) -> Self {
        Self { thread }
    }

    /// Current thread's blocker, as tracked by the scheduler.
    pub fn current() -> Self {
        Self {
            thread: crate::sched::wake::current_thread_id(),
        }
    }

    /// Parks on `queue` until woken or `timeout_ns` elapses (`None` =
    /// unbounded). Returns the wake reason. Does not itself re-test any
    /// predicate; callers loop around this per the usage example above.
    pub fn wait(&self, queue: &WaitQueue, timeout_ns: Option<u64>) -> WaitResult {
        queue.park(self.thread);
        if let Some(ns) = timeout_ns {
            crate::sched::wake::register_deadline(self.thread, ns);
        }
        crate::sched::wake::block_current();
        queue
            .take_result(self.thread)
            .unwrap_or(WaitResult::Error)
    }

    /// As [`Self::wait`], but releases `lock` after linking onto the queue
    /// and before yielding, re-acquiring it only once this function
    /// returns (the caller re-tests its predicate under the reacquired
    /// lock, per the source's `wait_block_lock`).
    pub fn wait_unlock<T>(
        &self,
        queue: &WaitQueue,
        guard: crate::sync::lock::LockGuard<'_, T>,
        timeout_ns: Option<u64>,
    ) -> WaitResult {
        queue.park(self.thread);
        if let Some(ns) = timeout_ns {
            crate::sched::wake::register_deadline(self.thread, ns);
        }
        drop(guard);
        crate::sched::wake::block_current();
        queue
            .take_result(self.thread)
            .unwrap_or(WaitResult::Error)
    }

    /// Blocks on several queues at once (e.g. futex-style multi-wait),
    /// returning which queue woke the thread and why.
    pub fn wait_many(&self, queues: &[&WaitQueue], timeout_ns: Option<u64>) -> (usize, WaitResult) {
        for q in queues {
            q.park(self.thread);
        }
        if let Some(ns) = timeout_ns {
            crate::sched::wake::register_deadline(self.thread, ns);
        }
        crate::sched::wake::block_current();
        for (i, q) in queues.iter().enumerate() {
            if let Some(result) = q.take_result(self.thread) {
                // Unlink from the other queues we did not wake from.
                for other in queues.iter().filter(|o| !core::ptr::eq(**o, *q)) {
                    let _ = other.take_result(self.thread);
                }
                return (i, result);
            }
        }
        (0, WaitResult::Error)
    }
}

/// Blocking mutex: spins briefly, then parks on a [`WaitQueue`].
/// Recursive on the same owner, matching the source's `mutex_t`.
pub struct Mutex {
    wait_queue: WaitQueue,
    spinlock: Lock<()>,
    owner: core::sync::atomic::AtomicU64,
    depth: core::sync::atomic::AtomicU32,
}

const NO_OWNER: u64 = u64::MAX;

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutex {
    pub const fn new() -> Self {
        Self {
            wait_queue: WaitQueue::new(),
            spinlock: Lock::new(()),
            owner: core::sync::atomic::AtomicU64::new(NO_OWNER),
            depth: core::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn acquire(&self) {
        self.acquire_timeout(None).expect("unbounded acquire cannot time out");
    }

    /// Acquires the mutex, blocking up to `timeout_ns` (`None` =
    /// unbounded). `Err(KernelError::Timeout)` if the deadline elapses
    /// first; the mutex remains owned by whoever held it.
    pub fn acquire_timeout(&self, timeout_ns: Option<u64>) -> KernelResult<()> {
        let me = crate::sched::wake::current_thread_id();

        if self.owner.load(core::sync::atomic::Ordering::Acquire) == me {
            self.depth.fetch_add(1, core::sync::atomic::Ordering::Relaxed);
            return Ok(());
        }

        for _ in 0..CONFIG_MUTEX_MAX_SLOW_SPIN {
            let guard = self.spinlock.acquire();
            if self.owner.load(core::sync::atomic::Ordering::Acquire) == NO_OWNER {
                self.owner.store(me, core::sync::atomic::Ordering::Release);
                self.depth.store(1, core::sync::atomic::Ordering::Relaxed);
                return Ok(());
            }
            drop(guard);
            core::hint::spin_loop();
        }

        let blocker = Blocker::for_thread(me);
        loop {
            let guard = self.spinlock.acquire();
            if self.owner.load(core::sync::atomic::Ordering::Acquire) == NO_OWNER {
                self.owner.store(me, core::sync::atomic::Ordering::Release);
                self.depth.store(1, core::sync::atomic::Ordering::Relaxed);
                return Ok(());
            }
            match blocker.wait_unlock(&self.wait_queue, guard, timeout_ns) {
                WaitResult::Norm => continue,
                other => return other.into_kernel_result(),
            }
        }
    }

    pub fn release(&self) {
        let _guard = self.spinlock.acquire();
        let depth = self.depth.fetch_sub(1, core::sync::atomic::Ordering::AcqRel);
        if depth == 1 {
            self.owner.store(NO_OWNER, core::sync::atomic::Ordering::Release);
            self.wait_queue.unblock(1, WaitResult::Norm);
        }
    }
}

/// Writer-preferring, non-recursive RW mutex with separate reader/writer
/// wait queues, per spec.md section 4.K.
pub struct RwMutex {
    reader_queue: WaitQueue,
    writer_queue: WaitQueue,
    state: Lock<RwMutexState>,
}

struct RwMutexState {
    active_readers: u32,
    writer_active: bool,
    pending_writers: u32,
}

impl Default for RwMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl RwMutex {
    pub const fn new() -> Self {
        Self {
            reader_queue: WaitQueue::new(),
            writer_queue: WaitQueue::new(),
            state: Lock::new(RwMutexState {
                active_readers: 0,
                writer_active: false,
                pending_writers: 0,
            }),
        }
    }

    pub fn read_acquire(&self) {
        let blocker = Blocker::current();
        loop {
            let guard = self.state.acquire();
            if !guard.writer_active && guard.pending_writers == 0 {
                let mut guard = guard;
                guard.active_readers += 1;
                return;
            }
            if blocker.wait_unlock(&self.reader_queue, guard, None) != WaitResult::Norm {
                continue;
            }
        }
    }

    pub fn read_release(&self) {
        let mut guard = self.state.acquire();
        guard.active_readers -= 1;
        if guard.active_readers == 0 && guard.pending_writers > 0 {
            drop(guard);
            self.writer_queue.unblock(1, WaitResult::Norm);
        }
    }

    pub fn write_acquire(&self) {
        let blocker = Blocker::current();
        {
            let mut guard = self.state.acquire();
            guard.pending_writers += 1;
        }
        loop {
            let guard = self.state.acquire();
            if !guard.writer_active && guard.active_readers == 0 {
                let mut guard = guard;
                guard.writer_active = true;
                guard.pending_writers -= 1;
                return;
            }
            if blocker.wait_unlock(&self.writer_queue, guard, None) != WaitResult::Norm {
                continue;
            }
        }
    }

    pub fn write_release(&self) {
        let mut guard = self.state.acquire();
        guard.writer_active = false;
        let writers_waiting = guard.pending_writers > 0;
        drop(guard);
        // Writers-first wake order, per spec.md section 4.K.
        if writers_waiting {
            self.writer_queue.unblock(1, WaitResult::Norm);
        } else {
            self.reader_queue.unblock_all(WaitResult::Norm);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn test_wait_queue_unblock_count() {
        let q = WaitQueue::new();
        q.park(1);
        q.park(2);
        q.park(3);
        let woken = q.unblock(2, WaitResult::Norm);
        assert_eq!(woken, 2);
        assert_eq!(q.take_result(3).is_none(), false);
    }
}
