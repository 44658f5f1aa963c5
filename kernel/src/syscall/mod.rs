//! System call dispatch.
//!
//! The ABI is a dense, boot-time-verified table of 34 slots (`SYS_*` in
//! the platform's `syscalls.h`): each slot holds a `SyscallDescriptor`
//! pairing a syscall number with its handler. Unlike the source, which
//! collects these into a linker `.syscall_table` section scanned via
//! `_syscallTableStart`/`_syscallTableEnd`, this kernel's default x86_64
//! build has no custom linker script (the bootloader owns layout), so
//! there are no section-boundary symbols to scan. `init_dispatch_table`
//! instead builds the table explicitly from named handlers, then performs
//! the same validation the source's `syscall_table_init()` does: sort by
//! number and assert the result is dense (`table[i].number == i` for
//! every `i`). The `#[link_section]` tagging on each entry is kept
//! anyway, in the same spirit as `test_framework::register_test!`, so the
//! table is still identifiable in a linked binary even though nothing
//! walks the section at runtime.

#![allow(dead_code)]

mod futex;
mod memory;
mod process;
mod time;
mod userspace;

use crate::error::Errno;

/// Total number of syscall slots in the ABI (`SYS_TOTAL_AMOUNT`).
pub const SYS_TOTAL_AMOUNT: usize = 34;

/// Result type returned by every syscall handler.
pub type SyscallResult = Result<usize, SyscallError>;

/// Signature every syscall handler is coerced to, regardless of its own
/// arity: unused trailing arguments are simply ignored by the wrapper.
pub type SyscallHandler = fn(usize, usize, usize, usize, usize) -> SyscallResult;

/// One entry in the dispatch table.
#[derive(Clone, Copy)]
pub struct SyscallDescriptor {
    pub number: usize,
    pub handler: SyscallHandler,
}

/// Errors a syscall handler can return. Carried back to user space as a
/// `-1` return value plus an errno stashed in the thread's errno slot
/// (see [`SyscallError::to_errno`] and `SYS_ERRNO`).
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    PermissionDenied,
    InvalidArgument,
    OutOfMemory,
    InvalidState,
    InvalidSyscall,
    Interrupted,
    InvalidPointer,
    WouldBlock,
    ResourceNotFound,
}

impl SyscallError {
    /// Maps a syscall-local error onto the crate-wide `errno` encoding.
    pub fn to_errno(self) -> Errno {
        match self {
            SyscallError::PermissionDenied => Errno::Permission,
            SyscallError::InvalidArgument => Errno::Invalid,
            SyscallError::OutOfMemory => Errno::NoMem,
            SyscallError::InvalidState => Errno::Invalid,
            SyscallError::InvalidSyscall => Errno::NotSupported,
            SyscallError::Interrupted => Errno::Interrupted,
            SyscallError::InvalidPointer => Errno::Fault,
            SyscallError::WouldBlock => Errno::Again,
            SyscallError::ResourceNotFound => Errno::NotFound,
        }
    }
}

/// Declares a [`SyscallDescriptor`] for `number`/`handler`, tagging it
/// into the `.syscall_table` section the way `SYSCALL_DEFINE` tags its
/// entries in the source. See the module doc comment for why this is
/// decorative rather than scanned.
macro_rules! syscall_entry {
    ($number:expr, $handler:expr) => {{
        #[used]
        #[link_section = ".syscall_table"]
        static ENTRY: SyscallDescriptor = SyscallDescriptor {
            number: $number,
            handler: $handler,
        };
        ENTRY
    }};
}

fn h_process_exit(a: usize, _b: usize, _c: usize, _d: usize, _e: usize) -> SyscallResult {
    process::sys_process_exit(a)
}

fn h_thread_exit(a: usize, _b: usize, _c: usize, _d: usize, _e: usize) -> SyscallResult {
    process::sys_thread_exit(a)
}

fn h_spawn(a: usize, b: usize, c: usize, _d: usize, _e: usize) -> SyscallResult {
    process::sys_spawn(a, b, c)
}

fn h_nanosleep(a: usize, b: usize, c: usize, d: usize, _e: usize) -> SyscallResult {
    time::sys_nanosleep(a, b, c, d)
}

fn h_getpid(_a: usize, _b: usize, _c: usize, _d: usize, _e: usize) -> SyscallResult {
    process::sys_getpid()
}

fn h_gettid(_a: usize, _b: usize, _c: usize, _d: usize, _e: usize) -> SyscallResult {
    process::sys_gettid()
}

fn h_munmap(a: usize, b: usize, _c: usize, _d: usize, _e: usize) -> SyscallResult {
    memory::sys_munmap(a, b)
}

fn h_mprotect(a: usize, b: usize, c: usize, _d: usize, _e: usize) -> SyscallResult {
    memory::sys_mprotect(a, b, c)
}

fn h_thread_create(a: usize, b: usize, c: usize, d: usize, _e: usize) -> SyscallResult {
    process::sys_thread_create(a, b, c, d)
}

fn h_yield(_a: usize, _b: usize, _c: usize, _d: usize, _e: usize) -> SyscallResult {
    crate::sched::yield_cpu();
    Ok(0)
}

/// Placeholder for ABI slots with no backing subsystem in this kernel
/// (the VFS the source built `open`/`read`/`write`/... on top of is out
/// of scope here; see DESIGN.md).
fn h_unimplemented(_a: usize, _b: usize, _c: usize, _d: usize, _e: usize) -> SyscallResult {
    Err(SyscallError::InvalidSyscall)
}

static DISPATCH_TABLE: spin::Once<[SyscallDescriptor; SYS_TOTAL_AMOUNT]> = spin::Once::new();

/// Builds and validates the dispatch table on first use, caching the
/// result. Panics if the table is not dense over `0..SYS_TOTAL_AMOUNT` --
/// a bug in this file, not something a caller can recover from.
pub fn init_dispatch_table() -> &'static [SyscallDescriptor; SYS_TOTAL_AMOUNT] {
    DISPATCH_TABLE.call_once(|| {
        let mut table = [
            syscall_entry!(0, h_process_exit),
            syscall_entry!(1, h_thread_exit),
            syscall_entry!(2, h_spawn),
            syscall_entry!(3, h_nanosleep),
            syscall_entry!(4, time::sys_errno),
            syscall_entry!(5, h_getpid),
            syscall_entry!(6, h_gettid),
            syscall_entry!(7, time::sys_uptime),
            syscall_entry!(8, time::sys_unix_epoch),
            syscall_entry!(9, h_unimplemented),  // SYS_OPEN
            syscall_entry!(10, h_unimplemented), // SYS_OPEN2
            syscall_entry!(11, h_unimplemented), // SYS_CLOSE
            syscall_entry!(12, h_unimplemented), // SYS_READ
            syscall_entry!(13, h_unimplemented), // SYS_WRITE
            syscall_entry!(14, h_unimplemented), // SYS_SEEK
            syscall_entry!(15, h_unimplemented), // SYS_IOCTL
            syscall_entry!(16, h_unimplemented), // SYS_CHDIR
            syscall_entry!(17, h_unimplemented), // SYS_POLL
            syscall_entry!(18, h_unimplemented), // SYS_STAT
            syscall_entry!(19, memory::sys_mmap),
            syscall_entry!(20, h_munmap),
            syscall_entry!(21, h_mprotect),
            syscall_entry!(22, h_unimplemented), // SYS_GETDENTS
            syscall_entry!(23, h_thread_create),
            syscall_entry!(24, h_yield),
            syscall_entry!(25, h_unimplemented), // SYS_DUP
            syscall_entry!(26, h_unimplemented), // SYS_DUP2
            syscall_entry!(27, futex::sys_futex_dispatch),
            syscall_entry!(28, h_unimplemented), // SYS_REMOVE
            syscall_entry!(29, h_unimplemented), // SYS_LINK
            syscall_entry!(30, h_unimplemented), // SYS_SHARE
            syscall_entry!(31, h_unimplemented), // SYS_CLAIM
            syscall_entry!(32, h_unimplemented), // SYS_BIND
            syscall_entry!(33, h_unimplemented), // SYS_OPENAT
        ];

        table.sort_by_key(|d| d.number);
        for (i, d) in table.iter().enumerate() {
            assert_eq!(d.number, i, "syscall table has a gap or duplicate at slot {i}");
        }
        table
    })
}

/// Builds and validates the dispatch table; call once during boot so a
/// malformed table panics at startup rather than on the first syscall.
pub fn init() {
    init_dispatch_table();
    crate::println!("[SYSCALL] Dispatch table initialized ({SYS_TOTAL_AMOUNT} slots)");
}

/// Assembly/MSR syscall entry point. Looks up `syscall_num` in the
/// dispatch table and invokes its handler; on error, stashes the mapped
/// errno on the calling thread (`SYS_ERRNO`) and returns `-1`.
#[no_mangle]
pub extern "C" fn syscall_handler(
    syscall_num: usize,
    arg1: usize,
    arg2: usize,
    arg3: usize,
    arg4: usize,
    arg5: usize,
) -> isize {
    let table = init_dispatch_table();

    let result = match table.get(syscall_num) {
        Some(desc) => (desc.handler)(arg1, arg2, arg3, arg4, arg5),
        None => Err(SyscallError::InvalidSyscall),
    };

    // Check for a pending kill/note before returning to user space, same
    // point the source checks for pending signals on syscall return.
    if let Some(thread) = crate::process::current_thread() {
        thread.handle_pending_notes();
    }

    match result {
        Ok(value) => value as isize,
        Err(error) => {
            if let Some(thread) = crate::process::current_thread() {
                thread.set_errno(error.to_errno() as i32);
            }
            -1
        }
    }
}
