//! # Critical Section
//!
//! Recursive mutual exclusion: the thread that holds the section may
//! re-enter it without deadlocking, and must `leave` once per `enter`.
//!
//! The recursion bookkeeping (owner + depth) lives in this crate rather
//! than in the backing mutex so that [`ConditionVariable::wait`] can fully
//! release the section - whatever the current depth - and restore it
//! before returning to the caller.
//!
//! [`ConditionVariable::wait`]: crate::ConditionVariable::wait

use std::marker::PhantomData;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

/// Ownership state of a critical section.
struct OwnerState {
    /// Thread currently inside the section, if any.
    owner: Option<ThreadId>,
    /// Recursion depth of the owning thread. Zero iff `owner` is `None`.
    depth: u32,
}

/// A recursive mutual-exclusion lock.
///
/// Unlike a plain mutex, the owning thread may call [`enter`] again while
/// already inside the section; the section is released once the matching
/// number of [`leave`] calls has been made.
///
/// # Example
///
/// ```rust,ignore
/// let cs = CriticalSection::new();
///
/// cs.enter();
/// cs.enter(); // re-entry from the same thread is fine
/// cs.leave();
/// cs.leave(); // now released
/// ```
///
/// [`enter`]: CriticalSection::enter
/// [`leave`]: CriticalSection::leave
pub struct CriticalSection {
    state: Mutex<OwnerState>,
    released: Condvar,
}

impl CriticalSection {
    /// Creates a new, unowned critical section.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(OwnerState {
                owner: None,
                depth: 0,
            }),
            released: Condvar::new(),
        }
    }

    /// Enters the section, blocking until it is available.
    ///
    /// Re-entry from the owning thread succeeds immediately and bumps the
    /// recursion depth.
    pub fn enter(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.owner == Some(me) {
            state.depth += 1;
            return;
        }

        while state.owner.is_some() {
            self.released.wait(&mut state);
        }

        state.owner = Some(me);
        state.depth = 1;
    }

    /// Attempts to enter the section without blocking.
    ///
    /// Returns `true` if the section was entered (including re-entry by
    /// the owning thread).
    #[must_use]
    pub fn try_enter(&self) -> bool {
        let me = thread::current().id();
        let mut state = self.state.lock();

        match state.owner {
            Some(owner) if owner == me => {
                state.depth += 1;
                true
            }
            Some(_) => false,
            None => {
                state.owner = Some(me);
                state.depth = 1;
                true
            }
        }
    }

    /// Leaves the section, undoing one matching [`enter`].
    ///
    /// # Panics
    ///
    /// Panics if the calling thread does not own the section. An
    /// unbalanced `leave` is a programmer error, never silent corruption.
    ///
    /// [`enter`]: CriticalSection::enter
    pub fn leave(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();

        assert_eq!(
            state.owner,
            Some(me),
            "leave() called by a thread that does not own the critical section"
        );

        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.released.notify_one();
        }
    }

    /// Enters the section and returns a guard that leaves on drop.
    #[must_use]
    pub fn guard(&self) -> CriticalSectionGuard<'_> {
        self.enter();
        CriticalSectionGuard {
            section: self,
            _not_send: PhantomData,
        }
    }

    /// Returns `true` if the calling thread currently owns the section.
    #[must_use]
    pub fn is_held_by_current_thread(&self) -> bool {
        let me = thread::current().id();
        self.state.lock().owner == Some(me)
    }

    /// Releases the section completely and returns the recursion depth
    /// that was held. Used by the condition variable to park a waiter.
    ///
    /// Panics if the calling thread does not own the section.
    pub(crate) fn release_all(&self) -> u32 {
        let me = thread::current().id();
        let mut state = self.state.lock();

        assert_eq!(
            state.owner,
            Some(me),
            "waiting on a condition variable requires holding the critical section"
        );

        let depth = state.depth;
        state.owner = None;
        state.depth = 0;
        self.released.notify_one();
        depth
    }

    /// Re-enters the section at a previously saved recursion depth.
    pub(crate) fn reacquire(&self, depth: u32) {
        debug_assert!(depth > 0);

        let me = thread::current().id();
        let mut state = self.state.lock();

        while state.owner.is_some() {
            self.released.wait(&mut state);
        }

        state.owner = Some(me);
        state.depth = depth;
    }
}

impl Default for CriticalSection {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped ownership of a [`CriticalSection`]; leaves on drop.
pub struct CriticalSectionGuard<'a> {
    section: &'a CriticalSection,
    /// Guards must be released by the thread that entered.
    _not_send: PhantomData<*const ()>,
}

impl Drop for CriticalSectionGuard<'_> {
    fn drop(&mut self) {
        self.section.leave();
    }
}
