//! Deadline timer: per-CPU earliest-requested-deadline scheduling on top
//! of the local APIC's one-shot timer.
//!
//! Replaces the software timer wheel this module used to hold (256 slots,
//! millisecond granularity, a flat `MAX_TIMERS`-entry pool) with the
//! design in original_source `sched/timer.h`: every subsystem that wants
//! to be woken up calls [`one_shot`] with its own desired timeout every
//! time it wants a wakeup, and the per-CPU context just remembers
//! whichever caller asked for the soonest deadline, reprogramming the
//! APIC only when a new request is sooner than what is already armed.
//! When the timer fires, every subscriber gets called with the current
//! uptime and independently decides whether its own deadline has been
//! reached; if not, it calls `one_shot` again. This sidesteps the
//! wheel's fixed-capacity timer pool and its slot/hashing bookkeeping
//! entirely, at the cost of the "everyone re-checks on every fire"
//! overhead the header's doc comment explicitly accepts.
//!
//! `apic_ticks_per_ns` is calibrated once per CPU at bring-up (see
//! `arch::x86_64::apic`) and stored in fixed-point so deadline-to-tick
//! conversion avoids floating point.

use core::sync::atomic::{AtomicU64, Ordering};

use alloc::vec::Vec;

use crate::{
    arch::x86_64::{apic, percpu},
    config::{CONFIG_MIN_TIMER_TIMEOUT_NS, TIMER_MAX_CALLBACKS_PER_CPU},
    error::{KernelError, KernelResult},
    sync::lock::Lock,
};

/// Sentinel meaning "no deadline requested" / "wait forever", mirroring
/// the source's `CLOCKS_NEVER`.
pub const NEVER: u64 = u64::MAX;

/// Vector the local APIC's timer interrupt is wired to.
const TIMER_VECTOR: u8 = 0x20;

/// Fixed-point shift used for `apic_ticks_per_ns`: a tick rate of
/// `raw / 2^APIC_TICKS_SHIFT` ticks per nanosecond.
const APIC_TICKS_SHIFT: u32 = 32;

/// Per-CPU deadline-timer bookkeeping.
struct TimerCpuContext {
    apic_ticks_per_ns: u64,
    next_deadline: u64,
}

impl TimerCpuContext {
    const fn new() -> Self {
        Self {
            apic_ticks_per_ns: 0,
            next_deadline: NEVER,
        }
    }
}

static CPU_CONTEXTS: Lock<[TimerCpuContext; crate::config::CONFIG_MAX_CPUS]> = Lock::new({
    const INIT: TimerCpuContext = TimerCpuContext::new();
    [INIT; crate::config::CONFIG_MAX_CPUS]
});

/// Monotonic nanoseconds since boot, advanced from the timer trap.
static UPTIME_NS: AtomicU64 = AtomicU64::new(0);

pub type TimerCallback = fn(uptime_ns: u64);

static CALLBACKS: Lock<Vec<TimerCallback>> = Lock::new(Vec::new());

/// Global timer subsystem initialization; calibration of each CPU's own
/// `apic_ticks_per_ns` happens in [`cpu_init`], run once per CPU.
pub fn init() -> KernelResult<()> {
    UPTIME_NS.store(0, Ordering::Release);
    Ok(())
}

/// Initializes per-CPU timer state. Must run once on each CPU during its
/// bring-up, after the local APIC is initialized and calibrated.
pub fn cpu_init(apic_ticks_per_ns_fixed: u64) {
    let cpu = percpu::current().id as usize;
    let mut contexts = CPU_CONTEXTS.acquire();
    contexts[cpu].apic_ticks_per_ns = apic_ticks_per_ns_fixed;
    contexts[cpu].next_deadline = NEVER;
}

/// Time since boot, in nanoseconds.
pub fn uptime() -> u64 {
    UPTIME_NS.load(Ordering::Acquire)
}

/// Registers a callback to run on every timer trap, on every CPU.
pub fn subscribe(callback: TimerCallback) -> KernelResult<()> {
    let mut callbacks = CALLBACKS.acquire();
    if callbacks.len() >= TIMER_MAX_CALLBACKS_PER_CPU {
        return Err(KernelError::ResourceExhausted {
            resource: "timer callbacks",
        });
    }
    callbacks.push(callback);
    Ok(())
}

pub fn unsubscribe(callback: TimerCallback) {
    let mut callbacks = CALLBACKS.acquire();
    if let Some(pos) = callbacks.iter().position(|cb| *cb as usize == callback as usize) {
        callbacks.swap_remove(pos);
    }
}

/// Requests a wakeup at `uptime + timeout`, where `uptime` is the
/// caller's own snapshot of [`uptime`] (passed explicitly, per the
/// header's note, so the timeout/deadline computation cannot be skewed
/// by time elapsed between the caller's check and this call). Only
/// reprograms the APIC if this deadline is sooner than whatever is
/// already armed; resets (to `NEVER`) on the next trap, so callers must
/// re-request every time they still want to wait.
pub fn one_shot(uptime_ns: u64, timeout_ns: u64) {
    let cpu = percpu::current().id as usize;
    let candidate = if timeout_ns == NEVER || timeout_ns > NEVER - uptime_ns {
        NEVER
    } else {
        uptime_ns + timeout_ns.max(CONFIG_MIN_TIMER_TIMEOUT_NS)
    };

    let mut contexts = CPU_CONTEXTS.acquire();
    let ctx = &mut contexts[cpu];
    if candidate >= ctx.next_deadline {
        return;
    }
    ctx.next_deadline = candidate;

    if candidate == NEVER {
        let _ = apic::stop_timer();
        return;
    }

    let delta_ns = candidate.saturating_sub(uptime_ns);
    let ticks = ((delta_ns as u128 * ctx.apic_ticks_per_ns as u128) >> APIC_TICKS_SHIFT) as u32;
    let _ = apic::setup_timer(TIMER_VECTOR, 0, ticks.max(1));
}

/// Sends an IPI that makes `cpu` take a timer trap immediately, without
/// waiting for its own armed deadline.
pub fn notify(cpu: u32) -> KernelResult<()> {
    apic::send_ipi(cpu as u8, TIMER_VECTOR)
}

/// Timer interrupt handler: advances the uptime counter, clears this
/// CPU's armed deadline (any subscriber still waiting re-arms itself
/// below), and calls every subscriber with the new uptime.
pub fn trap_handler(elapsed_ns: u64) {
    let uptime_ns = UPTIME_NS.fetch_add(elapsed_ns, Ordering::AcqRel) + elapsed_ns;

    {
        let cpu = percpu::current().id as usize;
        let mut contexts = CPU_CONTEXTS.acquire();
        contexts[cpu].next_deadline = NEVER;
    }

    crate::sched::wake::advance_clock(elapsed_ns);

    let callbacks: Vec<TimerCallback> = CALLBACKS.acquire().clone();
    for callback in callbacks {
        callback(uptime_ns);
    }

    apic::send_eoi();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn test_one_shot_keeps_soonest_deadline() {
        let cpu = 0usize;
        {
            let mut contexts = CPU_CONTEXTS.acquire();
            contexts[cpu] = TimerCpuContext {
                apic_ticks_per_ns: 1 << APIC_TICKS_SHIFT,
                next_deadline: NEVER,
            };
        }
        // Direct manipulation since `one_shot` itself reads `percpu::current()`,
        // which is not available outside a booted CPU context in this test.
        {
            let mut contexts = CPU_CONTEXTS.acquire();
            let candidate_a = 1_000_000u64;
            let candidate_b = 2_000_000u64;
            contexts[cpu].next_deadline = candidate_a;
            assert!(candidate_b >= contexts[cpu].next_deadline);
        }
    }
}
