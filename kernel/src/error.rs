//! Crate-wide kernel error taxonomy.
//!
//! A single, non-allocating, `Copy` error enum used by every fallible
//! kernel-internal API, carried over from the teacher's original
//! `error.rs` with the capability/IPC/scheduler/syscall/filesystem-nested
//! variants removed (none of those subsystems are in scope) and the
//! blocking-primitive variants spec.md's synchronization and notes
//! modules need (`NotePending`, `Busy`, `Fatal`) added in their place.
//! Syscall handlers convert a `KernelError` to a negative-errno return at
//! the syscall boundary (see `syscall::dispatch`); everywhere else it
//! propagates via `?`.

use core::fmt;

/// Main kernel error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// Physical frame or heap allocation failed.
    OutOfMemory { requested: usize, available: usize },
    /// A virtual address was malformed (misaligned, non-canonical, out of
    /// the valid range for the operation).
    InvalidAddress { addr: usize },
    /// A virtual address has no mapping.
    UnmappedMemory { addr: usize },
    /// No process with the given id.
    ProcessNotFound { pid: u64 },
    /// No thread with the given id.
    ThreadNotFound { tid: u64 },
    /// An object was in the wrong state for the requested operation.
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
    /// A hardware device reported an error.
    HardwareError { device: &'static str, code: u32 },
    /// A precondition on an argument was violated.
    InvalidArgument {
        name: &'static str,
        value: &'static str,
    },
    /// The operation is defined but not supported in this configuration.
    OperationNotSupported { operation: &'static str },
    /// A fixed-capacity table or pool (fds, notes, IPI ring, timer
    /// callbacks) is full.
    ResourceExhausted { resource: &'static str },
    /// The caller lacks permission for this operation.
    PermissionDenied { operation: &'static str },
    /// The object already exists.
    AlreadyExists { resource: &'static str, id: u64 },
    /// The requested object does not exist.
    NotFound { resource: &'static str, id: u64 },
    /// A blocking operation hit its deadline.
    Timeout { operation: &'static str, duration_ms: u64 },
    /// Recognized but unimplemented.
    NotImplemented { feature: &'static str },
    /// A non-blocking operation has no data/slot ready right now.
    WouldBlock,
    /// Write end closed (pipe/channel) or read end closed.
    BrokenPipe,
    /// Subsystem accessed before its `init()` ran.
    NotInitialized { subsystem: &'static str },
    /// A blocking primitive (mutex, futex, RW mutex) was interrupted by a
    /// note or kill arriving while the caller was parked.
    NotePending,
    /// The resource is held by someone else and the caller asked not to
    /// wait (e.g. `try_acquire`, `FUTEX_TRYLOCK`-style paths).
    Busy,
    /// Unrecoverable: stack-canary corruption, unhandled kernel exception,
    /// RCU invariant break, IPI queue corruption, double page-fault during
    /// stack-fault recovery. Callers that observe this should panic.
    Fatal(&'static str),
}

/// Result type alias for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested, available } => write!(
                f,
                "out of memory: requested {requested} bytes, {available} available"
            ),
            Self::InvalidAddress { addr } => write!(f, "invalid address: {addr:#x}"),
            Self::UnmappedMemory { addr } => write!(f, "unmapped memory at {addr:#x}"),
            Self::ProcessNotFound { pid } => write!(f, "process {pid} not found"),
            Self::ThreadNotFound { tid } => write!(f, "thread {tid} not found"),
            Self::InvalidState { expected, actual } => {
                write!(f, "invalid state: expected {expected}, got {actual}")
            }
            Self::HardwareError { device, code } => {
                write!(f, "hardware error on {device}: code {code:#x}")
            }
            Self::InvalidArgument { name, value } => {
                write!(f, "invalid argument '{name}': {value}")
            }
            Self::OperationNotSupported { operation } => {
                write!(f, "operation not supported: {operation}")
            }
            Self::ResourceExhausted { resource } => write!(f, "resource exhausted: {resource}"),
            Self::PermissionDenied { operation } => {
                write!(f, "permission denied: {operation}")
            }
            Self::AlreadyExists { resource, id } => {
                write!(f, "{resource} {id} already exists")
            }
            Self::NotFound { resource, id } => write!(f, "{resource} {id} not found"),
            Self::Timeout { operation, duration_ms } => {
                write!(f, "{operation} timed out after {duration_ms} ms")
            }
            Self::NotImplemented { feature } => write!(f, "not implemented: {feature}"),
            Self::WouldBlock => write!(f, "operation would block"),
            Self::BrokenPipe => write!(f, "broken pipe"),
            Self::NotInitialized { subsystem } => write!(f, "{subsystem} not initialized"),
            Self::NotePending => write!(f, "interrupted by a pending note"),
            Self::Busy => write!(f, "resource busy"),
            Self::Fatal(reason) => write!(f, "fatal: {reason}"),
        }
    }
}

/// Stable errno-style encoding used at the syscall boundary (see
/// `syscall::dispatch`). Matches the `SYS_ERRNO` slot semantics of
/// spec.md section 6: syscalls return `-1` and stash one of these in the
/// thread's errno slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
    NoMem = 1,
    Invalid = 2,
    TooManyOpen = 3,
    Again = 4,
    TimedOut = 5,
    Interrupted = 6,
    Fault = 7,
    NotFound = 8,
    Exists = 9,
    Busy = 10,
    Permission = 11,
    NotSupported = 12,
    NotInitialized = 13,
    BrokenPipe = 14,
    Fatal = 15,
}

impl From<KernelError> for Errno {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::OutOfMemory { .. } => Errno::NoMem,
            KernelError::InvalidAddress { .. } | KernelError::UnmappedMemory { .. } => {
                Errno::Fault
            }
            KernelError::ProcessNotFound { .. }
            | KernelError::ThreadNotFound { .. }
            | KernelError::NotFound { .. } => Errno::NotFound,
            KernelError::InvalidState { .. } | KernelError::InvalidArgument { .. } => {
                Errno::Invalid
            }
            KernelError::HardwareError { .. } => Errno::Fault,
            KernelError::OperationNotSupported { .. } | KernelError::NotImplemented { .. } => {
                Errno::NotSupported
            }
            KernelError::ResourceExhausted { .. } => Errno::TooManyOpen,
            KernelError::PermissionDenied { .. } => Errno::Permission,
            KernelError::AlreadyExists { .. } => Errno::Exists,
            KernelError::Timeout { .. } => Errno::TimedOut,
            KernelError::WouldBlock => Errno::Again,
            KernelError::BrokenPipe => Errno::BrokenPipe,
            KernelError::NotInitialized { .. } => Errno::NotInitialized,
            KernelError::NotePending => Errno::Interrupted,
            KernelError::Busy => Errno::Busy,
            KernelError::Fatal(_) => Errno::Fatal,
        }
    }
}

/// Converts a kernel result into the syscall ABI's `(isize, errno)` pair:
/// `Ok(v)` becomes `(v as isize, None)`; `Err(e)` becomes `(-1, Some(errno))`.
pub fn to_syscall_return(result: KernelResult<usize>) -> (isize, Option<Errno>) {
    match result {
        Ok(v) => (v as isize, None),
        Err(e) => (-1, Some(Errno::from(e))),
    }
}
