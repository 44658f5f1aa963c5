//! Per-CPU record access via the GS segment base.
//!
//! Every logical CPU's [`CpuRecord`] is reachable through the GS-base
//! register rather than an array indexed by a CPUID-derived id. The boot
//! trampoline leaks one `CpuRecord` per CPU and writes its address into
//! `GS::write_base` once, during that CPU's bring-up; from then on
//! `current()` is a single `rdgsbase`-equivalent read away.
//!
//! This replaces the CPUID-leaf-1-based `current_cpu_id()` lookup and the
//! `static mut [Option<PerCpuData>; MAX_CPUS]` array this crate used before:
//! both made every per-CPU access pay for an indirect table lookup and left
//! the array as an unsynchronized `static mut`. A GS-relative pointer is the
//! standard approach and is O(1) with no shared mutable state to alias.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use x86_64::{registers::segmentation::{Segment64, GS}, VirtAddr};

use crate::config::CONFIG_MAX_CPUS;

/// Per-CPU interrupt-disable nesting state plus identity fields.
///
/// The nesting counter and saved-flags word implement the discipline of
/// spec.md section 4.D: `push` saves the caller's IF on first entry and
/// clears IF; `pop` decrements and restores IF only once the depth reaches
/// zero. All IRQ-safe locks in `sync::lock`/`sync::rwlock`/`sync::seqlock`
/// bracket their critical sections with this pair.
#[repr(C)]
pub struct CpuRecord {
    /// Logical CPU id assigned at boot (0-based, dense).
    pub id: u32,
    /// Local APIC id, as read from CPUID during bring-up.
    pub apic_id: u32,
    /// Interrupt-disable nesting depth. Zero means interrupts are under the
    /// thread's/kernel's normal control.
    depth: AtomicU32,
    /// `true` if interrupts were enabled the moment depth transitioned
    /// 0 -> 1; restored when depth transitions back to 0.
    saved_if: AtomicBool,
    /// Monotonically increasing tick count driven by the deadline timer
    /// (see `timer` module); used by the reaper's deferred-free queue.
    pub ticks: AtomicU64,
}

impl CpuRecord {
    const fn new(id: u32, apic_id: u32) -> Self {
        Self {
            id,
            apic_id,
            depth: AtomicU32::new(0),
            saved_if: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
        }
    }
}

static RECORDS: [core::sync::atomic::AtomicPtr<CpuRecord>; CONFIG_MAX_CPUS] = {
    const INIT: core::sync::atomic::AtomicPtr<CpuRecord> =
        core::sync::atomic::AtomicPtr::new(core::ptr::null_mut());
    [INIT; CONFIG_MAX_CPUS]
};

/// Allocates and installs the calling CPU's record, then points GS at it.
///
/// Must be called exactly once per CPU, from that CPU, during its bring-up
/// trampoline, before any lock is taken or interrupt is unmasked.
///
/// # Safety
/// The caller must guarantee this runs on the target CPU (GS is per-core
/// state) and that `id` is unique and below `CONFIG_MAX_CPUS`.
pub unsafe fn install(id: u32, apic_id: u32) {
    let record = alloc::boxed::Box::leak(alloc::boxed::Box::new(CpuRecord::new(id, apic_id)));
    RECORDS[id as usize].store(record as *mut CpuRecord, Ordering::Release);
    // SAFETY: `record` is a valid, leaked `'static` allocation; writing its
    // address as the GS base is the documented mechanism for per-CPU access
    // and does not alias any other memory.
    unsafe {
        GS::write_base(VirtAddr::from_ptr(record as *const CpuRecord));
    }
}

/// Returns the calling CPU's record.
///
/// # Panics
/// Panics if called before `install` has run on this CPU (a logic error:
/// every entry path onto a CPU goes through the boot trampoline first).
pub fn current() -> &'static CpuRecord {
    let base = GS::read_base().as_u64();
    assert!(base != 0, "percpu::current() called before percpu::install()");
    // SAFETY: `base` was written by `install` from a leaked `Box<CpuRecord>`
    // and is never subsequently freed or mutated in place (only atomics
    // inside it change), so the reference is valid for 'static.
    unsafe { &*(base as *const CpuRecord) }
}

/// Looks up another CPU's record by id, if it has been installed.
pub fn by_id(id: u32) -> Option<&'static CpuRecord> {
    let ptr = RECORDS.get(id as usize)?.load(Ordering::Acquire);
    if ptr.is_null() {
        None
    } else {
        // SAFETY: non-null only after `install` stored a leaked `'static`
        // allocation for this slot.
        Some(unsafe { &*ptr })
    }
}

/// Raises the interrupt-disable nesting depth by one, disabling interrupts
/// if this is the outermost entry.
pub fn cli_push() {
    let rec = current();
    let was_enabled = x86_64::instructions::interrupts::are_enabled();
    x86_64::instructions::interrupts::disable();
    if rec.depth.fetch_add(1, Ordering::AcqRel) == 0 {
        rec.saved_if.store(was_enabled, Ordering::Release);
    }
}

/// Lowers the interrupt-disable nesting depth by one, restoring the
/// pre-`cli_push` interrupt state once depth reaches zero.
///
/// # Panics
/// Panics on an unbalanced `cli_pop` (depth underflow), which indicates a
/// lock was released without a matching acquire.
pub fn cli_pop() {
    let rec = current();
    let prev = rec.depth.fetch_sub(1, Ordering::AcqRel);
    assert!(prev != 0, "cli_pop without matching cli_push");
    if prev == 1 && rec.saved_if.load(Ordering::Acquire) {
        x86_64::instructions::interrupts::enable();
    }
}

/// `true` if the calling CPU currently has interrupts disabled via
/// `cli_push` (nesting depth > 0). Used by RCU's reader side (section 4.L):
/// on this design, disabling preemption is equivalent to disabling
/// interrupts, so `rcu::read_lock`/`read_unlock` are thin wrappers over
/// these two functions.
pub fn cli_depth() -> u32 {
    current().depth.load(Ordering::Acquire)
}
