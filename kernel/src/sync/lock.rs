//! IRQ-safe ticket spinlock.
//!
//! A direct port of the reference kernel's lock-free-acquire-path idiom
//! (see `sync::once_lock` for the crate's `compare_exchange`-based globals)
//! applied to the ticket-lock algorithm of the original kernel's
//! `sync/lock.h`: two monotonically increasing counters, `next_ticket` and
//! `now_serving`. Acquire brackets the critical section with the per-CPU
//! interrupt-disable nesting counter (`arch::x86_64::percpu::cli_push`/
//! `cli_pop`), so every lock in this crate is safe to take from, and safe
//! against, interrupt context.

use core::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicU16, Ordering},
};

use crate::arch::x86_64::percpu::{cli_pop, cli_push};

/// Iterations spent spinning before a debug build considers the lock
/// deadlocked.
#[cfg(debug_assertions)]
const DEADLOCK_ITERATIONS: u64 = 10_000_000;

/// A non-recursive, IRQ-safe ticket spinlock.
///
/// Acquiring a lock already held by the calling CPU deadlocks, same as the
/// source: this lock does not detect self-recursion, only (in debug
/// builds) excessive spinning.
pub struct Lock<T: ?Sized> {
    next_ticket: AtomicU16,
    now_serving: AtomicU16,
    data: UnsafeCell<T>,
}

// SAFETY: `Lock<T>` serializes all access to `data` through the ticket
// protocol below; `T: Send` is sufficient for `Sync` because only one
// thread at a time ever gets a `&mut T` out of it.
unsafe impl<T: ?Sized + Send> Sync for Lock<T> {}
unsafe impl<T: ?Sized + Send> Send for Lock<T> {}

impl<T> Lock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            next_ticket: AtomicU16::new(0),
            now_serving: AtomicU16::new(0),
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> Lock<T> {
    /// Acquires the lock, disabling interrupts on the current CPU for the
    /// duration of the returned guard.
    pub fn acquire(&self) -> LockGuard<'_, T> {
        cli_push();

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);

        #[cfg(debug_assertions)]
        let mut iterations = 0u64;

        while self.now_serving.load(Ordering::Acquire) != ticket {
            core::hint::spin_loop();

            #[cfg(debug_assertions)]
            {
                iterations += 1;
                assert!(
                    iterations < DEADLOCK_ITERATIONS,
                    "deadlock detected acquiring Lock"
                );
            }
        }

        core::sync::atomic::fence(Ordering::SeqCst);
        LockGuard { lock: self }
    }

    /// Attempts to acquire without spinning; `None` if another ticket is
    /// already being served ahead of the next one that would be issued.
    pub fn try_acquire(&self) -> Option<LockGuard<'_, T>> {
        cli_push();
        let ticket = self.next_ticket.load(Ordering::Relaxed);
        if self.now_serving.load(Ordering::Acquire) != ticket {
            cli_pop();
            return None;
        }
        if self
            .next_ticket
            .compare_exchange(ticket, ticket + 1, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            cli_pop();
            return None;
        }
        core::sync::atomic::fence(Ordering::SeqCst);
        Some(LockGuard { lock: self })
    }

    fn release(&self) {
        self.now_serving.fetch_add(1, Ordering::Release);
        cli_pop();
    }
}

/// RAII guard returned by [`Lock::acquire`]; releases and restores
/// interrupts on drop.
pub struct LockGuard<'a, T: ?Sized> {
    lock: &'a Lock<T>,
}

impl<T: ?Sized> Deref for LockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: the ticket protocol guarantees exclusive access for the
        // lifetime of this guard.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for LockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: same as above, and we hold `&mut self`.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for LockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn test_basic_lock() {
        let lock = Lock::new(0u32);
        {
            let mut guard = lock.acquire();
            *guard += 1;
        }
        assert_eq!(*lock.acquire(), 1);
    }

    #[test_case]
    fn test_try_acquire_contended() {
        let lock = Lock::new(0u32);
        let _guard = lock.acquire();
        // A ticket is already being served by `_guard`; a fresh try_acquire
        // must observe the mismatch and back off rather than spin.
        assert!(lock.try_acquire().is_none());
    }
}
