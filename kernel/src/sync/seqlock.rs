//! Sequence lock: lock-free reads of small, read-mostly state.
//!
//! Ported from the original kernel's `sync/seqlock.h`. A single sequence
//! counter is bumped before and after each write; readers snapshot the
//! counter, read the data without synchronization, then retry if the
//! counter changed or was odd (a write was in progress). Writers serialize
//! against each other with a `Lock` (`sync::lock::Lock`).

use core::{cell::UnsafeCell, sync::atomic::{AtomicU64, Ordering}};

use super::lock::Lock;

pub struct SeqLock<T> {
    sequence: AtomicU64,
    write_lock: Lock<()>,
    data: UnsafeCell<T>,
}

// SAFETY: writers are serialized by `write_lock`; readers only ever take an
// unsynchronized snapshot copy of `T` (via `Copy`/`Clone`), never a
// reference that could alias a concurrent write, so `Send` is sufficient.
unsafe impl<T: Send> Sync for SeqLock<T> {}
unsafe impl<T: Send> Send for SeqLock<T> {}

impl<T> SeqLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            sequence: AtomicU64::new(0),
            write_lock: Lock::new(()),
            data: UnsafeCell::new(data),
        }
    }

    /// Runs `f` under exclusive write access, bumping the sequence counter
    /// before and after so concurrent readers detect the write.
    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let _guard = self.write_lock.acquire();
        self.sequence.fetch_add(1, Ordering::Acquire);
        // SAFETY: `write_lock` guarantees only one writer at a time; the
        // sequence bump above has already told any in-flight reader to
        // retry before we touch `data`.
        let result = f(unsafe { &mut *self.data.get() });
        self.sequence.fetch_add(1, Ordering::Release);
        result
    }
}

impl<T: Copy> SeqLock<T> {
    /// Reads a consistent snapshot of `T`, retrying while a writer is
    /// interleaved with the read.
    pub fn read(&self) -> T {
        loop {
            let seq = self.sequence.load(Ordering::Acquire);
            // SAFETY: this is exactly the "optimistic read, verify after"
            // pattern the seqlock implements: the copy may observe a
            // torn/partial write, but we discard it below if `seq` turns
            // out to have changed or been odd, so no inconsistent value
            // ever escapes this function.
            let snapshot = unsafe { *self.data.get() };
            core::sync::atomic::fence(Ordering::Acquire);
            let seq_after = self.sequence.load(Ordering::Relaxed);
            if seq_after == seq && seq & 1 == 0 {
                return snapshot;
            }
            core::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn test_seqlock_roundtrip() {
        let lock = SeqLock::new(42u64);
        assert_eq!(lock.read(), 42);
        lock.write(|v| *v = 100);
        assert_eq!(lock.read(), 100);
    }
}
