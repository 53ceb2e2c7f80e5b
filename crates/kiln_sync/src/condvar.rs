//! # Condition Variable
//!
//! A condition variable bound to a [`CriticalSection`] per wait call.
//!
//! Waiting releases the section completely - including any recursion
//! depth - parks the caller, and restores the depth before returning.
//! The bridge mutex below makes release-and-park atomic with respect to
//! notifiers: a notifier that acquired the section after the waiter
//! released it cannot slip its notification in before the waiter parks.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::critical_section::CriticalSection;

/// A condition variable for predicates guarded by a [`CriticalSection`].
///
/// All waits may wake spuriously; callers must re-check their predicate.
pub struct ConditionVariable {
    /// Held across release-and-park so notifications cannot be lost.
    bridge: Mutex<()>,
    waiters: Condvar,
}

impl ConditionVariable {
    /// Creates a new condition variable with no waiters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bridge: Mutex::new(()),
            waiters: Condvar::new(),
        }
    }

    /// Releases `section` and parks until notified.
    ///
    /// The section's full recursion depth is restored before returning.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread does not hold `section`.
    pub fn wait(&self, section: &CriticalSection) {
        let mut bridge = self.bridge.lock();
        let depth = section.release_all();
        self.waiters.wait(&mut bridge);
        drop(bridge);
        section.reacquire(depth);
    }

    /// Releases `section` and parks until notified or `timeout` elapses.
    ///
    /// Returns `false` on timeout. A `true` return does not guarantee the
    /// predicate holds; wakes may be spurious.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread does not hold `section`.
    #[must_use]
    pub fn wait_timeout(&self, section: &CriticalSection, timeout: Duration) -> bool {
        let mut bridge = self.bridge.lock();
        let depth = section.release_all();
        let result = self.waiters.wait_for(&mut bridge, timeout);
        drop(bridge);
        section.reacquire(depth);
        !result.timed_out()
    }

    /// Wakes one parked waiter, if any.
    pub fn notify_one(&self) {
        let _bridge = self.bridge.lock();
        self.waiters.notify_one();
    }

    /// Wakes every parked waiter.
    pub fn notify_all(&self) {
        let _bridge = self.bridge.lock();
        self.waiters.notify_all();
    }
}

impl Default for ConditionVariable {
    fn default() -> Self {
        Self::new()
    }
}
