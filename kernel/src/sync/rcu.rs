//! Read-Copy-Update (RCU) Synchronization
//!
//! RCU provides extremely fast read-side access to shared data structures
//! without locks. Readers proceed without synchronization overhead while
//! writers create copies, update pointers atomically, and reclaim old
//! versions after a grace period.
//!
//! Grounded on original_source `sync/rcu.h`: the header defines
//! `rcu_read_lock`/`rcu_read_unlock` as plain interrupt disable/enable
//! (a CPU with interrupts enabled cannot be mid-critical-section) and
//! declares `rcu_call`/`rcu_synchronize`, leaving grace-period bookkeeping
//! to its `.c` file. This implementation keeps this crate's own
//! grace-period design (global generation counter, per-CPU
//! last-observed-generation array, deferred callback queue) but reuses
//! `arch::x86_64::percpu::{cli_push, cli_pop, cli_depth}` for the
//! reader-side critical section instead of a separate nesting counter,
//! since that is the same interrupt-disable discipline the header
//! specifies and this crate already centralizes it there for every
//! IRQ-safe lock (section 4.D).
//!
//! - Readers call `rcu_read_lock()` / `rcu_read_unlock()` to mark critical
//!   sections (these are now thin wrappers over the percpu nesting depth).
//! - Writers call `synchronize_rcu()` to wait for all pre-existing readers
//!   to complete, or `call_rcu()` to defer cleanup to a callback.
//! - Grace period detection uses per-CPU counters: when every registered
//!   CPU has passed through a quiescent state (`rcu_quiescent()`, called
//!   from the scheduler tick when that CPU's interrupt-disable depth is
//!   zero), the grace period is complete.

use alloc::{boxed::Box, vec::Vec};
use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

use crate::{arch::x86_64::percpu, config::CONFIG_MAX_CPUS};

// ---------------------------------------------------------------------------
// Per-CPU RCU state
// ---------------------------------------------------------------------------

/// Global RCU grace period counter. Incremented each time a grace period
/// completes. Writers snapshot this before waiting; when all CPUs have
/// observed a quiescent state since the snapshot, the grace period is done.
static RCU_GP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Per-CPU last-observed grace period. Updated each time a CPU passes
/// through a quiescent state.
#[allow(clippy::declare_interior_mutable_const)]
static RCU_CPU_GP: [AtomicU64; CONFIG_MAX_CPUS] = {
    const INIT: AtomicU64 = AtomicU64::new(0);
    [INIT; CONFIG_MAX_CPUS]
};

// ---------------------------------------------------------------------------
// Deferred callback queue
// ---------------------------------------------------------------------------

/// A deferred cleanup callback registered via `call_rcu()`.
struct RcuCallback {
    /// The grace period after which this callback can execute.
    target_gp: u64,
    /// The callback function.
    func: Box<dyn FnOnce() + Send>,
}

/// Queue of deferred RCU callbacks.
static RCU_CALLBACKS: Mutex<Vec<RcuCallback>> = Mutex::new(Vec::new());

// ---------------------------------------------------------------------------
// Reader API
// ---------------------------------------------------------------------------

/// Enter an RCU read-side critical section. Thin wrapper over the percpu
/// interrupt-disable nesting counter; nesting is supported because that
/// counter already supports nesting.
#[inline]
pub fn rcu_read_lock() {
    percpu::cli_push();
}

/// Exit an RCU read-side critical section.
#[inline]
pub fn rcu_read_unlock() {
    percpu::cli_pop();
}

/// Check whether the current CPU is inside an RCU read-side critical
/// section (equivalently, any IRQ-safe lock's critical section, since both
/// share the same nesting counter).
pub fn rcu_is_reading() -> bool {
    percpu::cli_depth() > 0
}

// ---------------------------------------------------------------------------
// Writer API
// ---------------------------------------------------------------------------

/// Wait for all pre-existing RCU read-side critical sections to complete.
///
/// After this function returns, it is safe to free memory that was visible
/// to readers before the call.
pub fn synchronize_rcu() {
    let target_gp = RCU_GP_COUNTER.fetch_add(1, Ordering::SeqCst) + 1;

    #[cfg(debug_assertions)]
    let mut iterations = 0u64;
    loop {
        let mut all_quiescent = true;
        for cpu in 0..CONFIG_MAX_CPUS {
            if percpu::by_id(cpu as u32).is_none() {
                // CPU never brought up; vacuously quiescent.
                continue;
            }
            let cpu_gp = RCU_CPU_GP[cpu].load(Ordering::Acquire);
            if cpu_gp < target_gp {
                all_quiescent = false;
                break;
            }
        }

        if all_quiescent {
            break;
        }

        core::hint::spin_loop();
        #[cfg(debug_assertions)]
        {
            iterations += 1;
            assert!(iterations < 100_000_000, "synchronize_rcu stalled indefinitely");
        }
    }

    process_callbacks(target_gp);
}

/// Register a deferred callback to be called after the next grace period.
///
/// The callback will be invoked after all CPUs have passed through a
/// quiescent state following this call. The callback must be `Send`
/// since it may execute on a different CPU.
pub fn call_rcu<F: FnOnce() + Send + 'static>(func: F) {
    let target_gp = RCU_GP_COUNTER.load(Ordering::Relaxed) + 1;
    let mut callbacks = RCU_CALLBACKS.lock();
    callbacks.push(RcuCallback {
        target_gp,
        func: Box::new(func),
    });
}

// ---------------------------------------------------------------------------
// Quiescent state reporting
// ---------------------------------------------------------------------------

/// Report that the current CPU has passed through a quiescent state.
///
/// Called from the scheduler tick. A CPU with interrupt-disable depth zero
/// is, by construction, not holding any RCU read-side reference.
pub fn rcu_quiescent() {
    if percpu::cli_depth() == 0 {
        let cpu = percpu::current().id as usize;
        let current_gp = RCU_GP_COUNTER.load(Ordering::Acquire);
        RCU_CPU_GP[cpu].store(current_gp, Ordering::Release);
    }
    process_callbacks(RCU_GP_COUNTER.load(Ordering::Acquire));
}

/// Process deferred callbacks whose grace periods have completed.
fn process_callbacks(completed_gp: u64) {
    let mut callbacks = RCU_CALLBACKS.lock();
    let mut i = 0;
    while i < callbacks.len() {
        if callbacks[i].target_gp <= completed_gp {
            let cb = callbacks.swap_remove(i);
            // Release lock before executing callback to avoid deadlock.
            drop(callbacks);
            (cb.func)();
            callbacks = RCU_CALLBACKS.lock();
            // Don't increment i since swap_remove moved the last element here.
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicBool;

    #[test_case]
    fn test_read_lock_tracks_depth() {
        assert!(!rcu_is_reading());
        rcu_read_lock();
        assert!(rcu_is_reading());
        rcu_read_unlock();
        assert!(!rcu_is_reading());
    }

    #[test_case]
    fn test_call_rcu_runs_after_quiescence() {
        static RAN: AtomicBool = AtomicBool::new(false);
        let target_gp = RCU_GP_COUNTER.load(Ordering::Relaxed) + 1;
        call_rcu(|| RAN.store(true, Ordering::Release));
        process_callbacks(target_gp);
        assert!(RAN.load(Ordering::Acquire));
    }
}
