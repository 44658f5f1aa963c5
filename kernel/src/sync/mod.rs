//! Synchronization Primitives
//!
//! Safe synchronization and global state management for Rust 2024 edition.

pub mod once_lock;
pub mod lock;
pub mod rwlock;
pub mod seqlock;
pub mod wait;
pub mod rcu;
pub mod futex;

pub use once_lock::{OnceLock, LazyLock, GlobalState};
pub use futex::{FutexContext, FutexOp};
pub use lock::{Lock, LockGuard};
pub use rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use seqlock::SeqLock;
pub use wait::{Blocker, Mutex, RwMutex, WaitQueue, WaitResult, WAIT_ALL};
