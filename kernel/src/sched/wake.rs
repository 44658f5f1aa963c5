//! Bridge between `sync::wait`'s queue/blocker primitives and the
//! scheduler's thread-state machine.
//!
//! Tracks, per `ThreadId`, whether the thread is parked and (if woken) why.
//! `block_current` deschedules the calling thread (`Thread::set_blocked`
//! plus `yield_cpu`, the same pattern `process::block_thread` uses) rather
//! than spinning; `wake_thread` resolves the thread ID back to its live
//! `Thread` via `process::table::find_thread` and re-enqueues it with
//! `wake_up_process`. The parking table only carries the wake reason and
//! any registered deadline -- scheduler state transitions are handled by
//! the thread/task machinery itself.

use core::sync::atomic::{AtomicU64, Ordering};

use alloc::vec::Vec;

use crate::{
    process::{self, ThreadId},
    sync::{lock::Lock, wait::WaitResult},
};

struct Parked {
    thread: u64,
    result: Option<WaitResult>,
    deadline_ns: Option<u64>,
}

static PARK_TABLE: Lock<Vec<Parked>> = Lock::new(Vec::new());
static CLOCK_NS: AtomicU64 = AtomicU64::new(0);

/// Advances the monotonic clock used to evaluate registered deadlines.
/// Called from the timer tick handler once the deadline-timer subsystem
/// is wired in.
pub fn advance_clock(delta_ns: u64) {
    let now = CLOCK_NS.fetch_add(delta_ns, Ordering::Relaxed) + delta_ns;
    let mut table = PARK_TABLE.acquire();
    for entry in table.iter_mut() {
        if entry.result.is_none() {
            if let Some(deadline) = entry.deadline_ns {
                if now >= deadline {
                    entry.result = Some(WaitResult::Timeout);
                }
            }
        }
    }
}

pub fn current_thread_id() -> u64 {
    process::get_thread_tid().0
}

/// Registers a wake deadline for `thread`, relative to the current clock.
pub fn register_deadline(thread: u64, timeout_ns: u64) {
    let now = CLOCK_NS.load(Ordering::Relaxed);
    let mut table = PARK_TABLE.acquire();
    if let Some(entry) = table.iter_mut().find(|e| e.thread == thread) {
        entry.deadline_ns = Some(now + timeout_ns);
    } else {
        table.push(Parked {
            thread,
            result: None,
            deadline_ns: Some(now + timeout_ns),
        });
    }
}

/// Parks the calling thread until `wake_thread` (or a registered
/// deadline) marks it runnable again. Deschedules the thread and yields
/// the CPU to the scheduler; control returns here only once some other
/// CPU (or the timer tick, via `advance_clock`) has recorded a result and
/// `wake_thread` has made the thread ready again.
pub fn block_current() {
    let me = current_thread_id();
    {
        let mut table = PARK_TABLE.acquire();
        if !table.iter().any(|e| e.thread == me) {
            table.push(Parked {
                thread: me,
                result: None,
                deadline_ns: None,
            });
        }
    }
    loop {
        {
            let mut table = PARK_TABLE.acquire();
            if let Some(idx) = table.iter().position(|e| e.thread == me && e.result.is_some()) {
                table.swap_remove(idx);
                return;
            }
        }
        if let Some(thread) = process::current_thread() {
            thread.set_blocked(None);
        }
        crate::sched::yield_cpu();
    }
}

/// Marks `thread` runnable with the given wake reason and re-enqueues it
/// in the scheduler. A no-op if the thread is not currently parked (e.g.
/// it already timed out) or no longer exists.
pub fn wake_thread(thread: u64, result: WaitResult) {
    {
        let mut table = PARK_TABLE.acquire();
        if let Some(entry) = table.iter_mut().find(|e| e.thread == thread) {
            entry.result = Some(result);
        } else {
            return;
        }
    }

    if let Some(thread_ref) = process::table::find_thread(ThreadId(thread)) {
        thread_ref.set_ready();
        crate::sched::wake_up_process(thread_ref.process);
    }
}
