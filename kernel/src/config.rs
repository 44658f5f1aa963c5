//! Compile-time kernel configuration constants.
//!
//! Centralises every `CONFIG_*` tunable consumed by the subsystems in this
//! crate. Values and meanings are carried over from the original kernel's
//! `config.h`; units are nanoseconds unless noted otherwise.

/// Pages allocated for each per-CPU IST stack (exception, double-fault,
/// interrupt).
pub const CONFIG_INTERRUPT_STACK_PAGES: usize = 1;

/// Maximum pages a per-thread kernel stack is allowed to grow to.
pub const CONFIG_MAX_KERNEL_STACK_PAGES: usize = 100;

/// Maximum pages a per-thread user stack is allowed to grow to.
pub const CONFIG_MAX_USER_STACK_PAGES: usize = 100;

/// Maximum open file descriptors per process.
pub const CONFIG_MAX_FD: usize = 64;

/// Maximum length of a thread's note queue.
pub const CONFIG_MAX_NOTES: usize = 8;

/// Maximum argv entries passed to a spawned process.
pub const CONFIG_MAX_ARGC: usize = 512;

/// Nominal scheduler time slice, in nanoseconds.
pub const CONFIG_TIME_SLICE_NS: u64 = 10_000_000; // 10 ms

/// Offset added to a thread's priority to compute its scheduling weight.
pub const CONFIG_WEIGHT_BASE: u64 = 1;

/// Minimum `|peer_load - self_load|` that triggers load balancing.
pub const CONFIG_LOAD_BALANCE_BIAS: u32 = 2;

/// Spin iterations a blocking mutex attempts before parking on its wait
/// queue.
pub const CONFIG_MUTEX_MAX_SLOW_SPIN: u32 = 1000;

/// Upper physical address bound managed by the PMM's bitmap backend; frames
/// at or above this address are managed by the LIFO free-stack backend.
pub const CONFIG_PMM_BITMAP_MAX_ADDR: u64 = 0x0400_0000; // 64 MiB

/// Minimum period, in nanoseconds, between process reaper sweeps.
pub const CONFIG_PROCESS_REAPER_INTERVAL_NS: u64 = 1_000_000_000; // 1 s

/// Whether the early boot logger mirrors output to the 16550 serial port.
pub const CONFIG_LOG_SERIAL: bool = true;

/// Floor below which a requested deadline-timer timeout is clamped up, to
/// avoid reprogramming the hardware one-shot on every near-immediate
/// request.
pub const CONFIG_MIN_TIMER_TIMEOUT_NS: u64 = 100_000; // 100 us

/// Depth of the in-memory diagnostic ring log surfaced under `/proc`.
pub const CONFIG_SCREEN_MAX_LINES: usize = 256;

/// Fixed capacity of a per-CPU deadline timer's registered-callback set.
pub const TIMER_MAX_CALLBACKS_PER_CPU: usize = 16;

/// Maximum logical CPUs supported by the per-CPU substrate.
pub const CONFIG_MAX_CPUS: usize = 16;

/// Fixed capacity of a per-CPU IPI ring buffer.
pub const CONFIG_IPI_RING_CAPACITY: usize = 16;
