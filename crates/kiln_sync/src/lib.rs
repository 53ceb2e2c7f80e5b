//! # KILN Sync Primitives
//!
//! Cross-platform synchronization primitives used by the engine:
//! critical section, condition variable, event, semaphore, barrier and
//! reader-writer lock.
//!
//! ## Architecture Rules
//!
//! 1. **One backing implementation per primitive** - every primitive is
//!    backed by exactly one facility (`parking_lot`), selected at build
//!    time. There is no per-call platform branching in this crate.
//! 2. **Programmer errors are fatal** - unbalanced `leave`, waiting
//!    without holding the lock, and similar misuse panic immediately.
//!    There is no recoverable error surface; only timed waits return a
//!    boolean indicating timeout.
//! 3. **Spurious wakes are part of the contract** - condition-variable
//!    waiters must re-check their predicate.

pub mod barrier;
pub mod condvar;
pub mod critical_section;
pub mod event;
pub mod rwlock;
pub mod semaphore;

pub use barrier::Barrier;
pub use condvar::ConditionVariable;
pub use critical_section::{CriticalSection, CriticalSectionGuard};
pub use event::{Event, EventKind};
pub use rwlock::{ReaderGuard, ReaderWriterLock, WriterGuard};
pub use semaphore::Semaphore;
