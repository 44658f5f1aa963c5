//! IRQ-safe, writer-preferring read-write ticket lock.
//!
//! Ported from the original kernel's `sync/rwlock.h`: four 16-bit ticket
//! counters (`read_ticket`/`read_serve`/`write_ticket`/`write_serve`) plus
//! an `active_readers` count. A reader takes its ticket, waits to be
//! served, then additionally waits for `write_serve == write_ticket`
//! (no writer ticket outstanding) before counting itself as active. A
//! writer takes its ticket, waits to be served, then waits for
//! `active_readers` to drain to zero. This makes the lock
//! writer-preferring: once a writer has taken a ticket, no reader that
//! arrives afterwards can be served ahead of it.

use core::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicU16, Ordering},
};

use crate::arch::x86_64::percpu::{cli_pop, cli_push};

#[cfg(debug_assertions)]
const DEADLOCK_ITERATIONS: u64 = 10_000_000;

pub struct RwLock<T: ?Sized> {
    read_ticket: AtomicU16,
    read_serve: AtomicU16,
    write_ticket: AtomicU16,
    write_serve: AtomicU16,
    active_readers: AtomicU16,
    data: UnsafeCell<T>,
}

// SAFETY: see `sync::lock::Lock` -- the ticket/counter protocol below is
// the sole means of access, so `Send` data is enough for `Sync`.
unsafe impl<T: ?Sized + Send> Sync for RwLock<T> {}
unsafe impl<T: ?Sized + Send> Send for RwLock<T> {}

impl<T> RwLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            read_ticket: AtomicU16::new(0),
            read_serve: AtomicU16::new(0),
            write_ticket: AtomicU16::new(0),
            write_serve: AtomicU16::new(0),
            active_readers: AtomicU16::new(0),
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> RwLock<T> {
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        cli_push();

        #[cfg(debug_assertions)]
        let mut iterations = 0u64;

        let ticket = self.read_ticket.fetch_add(1, Ordering::Relaxed);
        while self.read_serve.load(Ordering::Acquire) != ticket {
            core::hint::spin_loop();
            #[cfg(debug_assertions)]
            {
                iterations += 1;
                assert!(iterations < DEADLOCK_ITERATIONS, "deadlock in RwLock::read");
            }
        }

        // Writer-preference: do not become an active reader while any
        // writer ticket is still outstanding.
        while self.write_serve.load(Ordering::Relaxed) != self.write_ticket.load(Ordering::Relaxed)
        {
            core::hint::spin_loop();
            #[cfg(debug_assertions)]
            {
                iterations += 1;
                assert!(iterations < DEADLOCK_ITERATIONS, "deadlock in RwLock::read");
            }
        }

        self.active_readers.fetch_add(1, Ordering::Acquire);
        self.read_serve.fetch_add(1, Ordering::Release);

        RwLockReadGuard { lock: self }
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        cli_push();

        #[cfg(debug_assertions)]
        let mut iterations = 0u64;

        let ticket = self.write_ticket.fetch_add(1, Ordering::Relaxed);
        while self.write_serve.load(Ordering::Acquire) != ticket {
            core::hint::spin_loop();
            #[cfg(debug_assertions)]
            {
                iterations += 1;
                assert!(iterations < DEADLOCK_ITERATIONS, "deadlock in RwLock::write");
            }
        }

        while self.active_readers.load(Ordering::Acquire) > 0 {
            core::hint::spin_loop();
            #[cfg(debug_assertions)]
            {
                iterations += 1;
                assert!(iterations < DEADLOCK_ITERATIONS, "deadlock in RwLock::write");
            }
        }

        RwLockWriteGuard { lock: self }
    }

    fn read_release(&self) {
        self.active_readers.fetch_sub(1, Ordering::Release);
        cli_pop();
    }

    fn write_release(&self) {
        self.write_serve.fetch_add(1, Ordering::Release);
        cli_pop();
    }
}

pub struct RwLockReadGuard<'a, T: ?Sized> {
    lock: &'a RwLock<T>,
}

impl<T: ?Sized> Deref for RwLockReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: protocol above guarantees no writer is active while any
        // reader is counted.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.read_release();
    }
}

pub struct RwLockWriteGuard<'a, T: ?Sized> {
    lock: &'a RwLock<T>,
}

impl<T: ?Sized> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: protocol above guarantees exclusive access.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: same as above.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.write_release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn test_read_write() {
        let lock = RwLock::new(10u32);
        {
            let mut w = lock.write();
            *w += 5;
        }
        assert_eq!(*lock.read(), 15);
    }

    #[test_case]
    fn test_multiple_readers() {
        let lock = RwLock::new(1u32);
        let r1 = lock.read();
        let r2 = lock.read();
        assert_eq!(*r1, 1);
        assert_eq!(*r2, 1);
    }
}
