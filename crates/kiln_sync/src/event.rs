//! # Event
//!
//! A waitable boolean flag with two reset modes.
//!
//! - **Manual reset**: `set` wakes every waiter and the flag stays raised
//!   until an explicit `reset`. This is the mode the parallel-for control
//!   block uses for its completion signal.
//! - **Auto reset**: `set` releases exactly one waiter, and whoever
//!   consumes the flag (a waiter, or a `test` poll) clears it atomically.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Reset behavior of an [`Event`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Consuming a signaled event clears it; one `set` releases one waiter.
    AutoReset,
    /// The event stays signaled until [`Event::reset`]; `set` releases all
    /// waiters.
    ManualReset,
}

/// A waitable boolean flag.
pub struct Event {
    kind: EventKind,
    signaled: Mutex<bool>,
    waiters: Condvar,
}

impl Event {
    /// Creates an event with the given initial state and reset mode.
    #[must_use]
    pub fn new(signaled: bool, kind: EventKind) -> Self {
        Self {
            kind,
            signaled: Mutex::new(signaled),
            waiters: Condvar::new(),
        }
    }

    /// Signals the event.
    ///
    /// Auto-reset wakes exactly one waiter (which consumes the state);
    /// manual-reset wakes all waiters and the state stays raised.
    pub fn set(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        match self.kind {
            EventKind::AutoReset => {
                self.waiters.notify_one();
            }
            EventKind::ManualReset => {
                self.waiters.notify_all();
            }
        }
    }

    /// Clears the event without waking anyone.
    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }

    /// Blocks until the event is signaled.
    ///
    /// For auto-reset events the caller consumes the state on wake.
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            self.waiters.wait(&mut signaled);
        }
        if self.kind == EventKind::AutoReset {
            *signaled = false;
        }
    }

    /// Blocks until the event is signaled or `timeout` elapses.
    ///
    /// Returns `false` on timeout. Consume semantics match [`wait`].
    ///
    /// [`wait`]: Event::wait
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.signaled.lock();
        while !*signaled {
            if self.waiters.wait_until(&mut signaled, deadline).timed_out() {
                if *signaled {
                    break;
                }
                return false;
            }
        }
        if self.kind == EventKind::AutoReset {
            *signaled = false;
        }
        true
    }

    /// Non-blocking poll.
    ///
    /// Returns whether the event was signaled, with the same consume
    /// semantics as [`wait`] for auto-reset events.
    ///
    /// [`wait`]: Event::wait
    #[must_use]
    pub fn test(&self) -> bool {
        let mut signaled = self.signaled.lock();
        if !*signaled {
            return false;
        }
        if self.kind == EventKind::AutoReset {
            *signaled = false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn manual_reset_stays_signaled() {
        let event = Event::new(false, EventKind::ManualReset);
        assert!(!event.test());

        event.set();
        assert!(event.test());
        assert!(event.test());
        event.wait();

        event.reset();
        assert!(!event.test());
    }

    #[test]
    fn auto_reset_consumes_on_test() {
        let event = Event::new(true, EventKind::AutoReset);
        assert!(event.test());
        assert!(!event.test());
    }

    #[test]
    fn manual_reset_releases_all_waiters() {
        let event = Arc::new(Event::new(false, EventKind::ManualReset));
        let mut handles = Vec::new();

        for _ in 0..4 {
            let event = Arc::clone(&event);
            handles.push(thread::spawn(move || event.wait()));
        }

        thread::sleep(Duration::from_millis(20));
        event.set();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn auto_reset_releases_exactly_one_waiter() {
        let event = Arc::new(Event::new(false, EventKind::AutoReset));
        let woken = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::new();

        for _ in 0..2 {
            let event = Arc::clone(&event);
            let woken = Arc::clone(&woken);
            handles.push(thread::spawn(move || {
                event.wait();
                woken.fetch_add(1, Ordering::SeqCst);
            }));
        }

        thread::sleep(Duration::from_millis(30));
        event.set();
        thread::sleep(Duration::from_millis(50));

        // One waiter through, state consumed, the other still parked.
        assert_eq!(woken.load(Ordering::SeqCst), 1);
        assert!(!event.test());

        event.set();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(woken.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn wait_timeout_reports_timeout() {
        let event = Event::new(false, EventKind::ManualReset);
        assert!(!event.wait_timeout(Duration::from_millis(20)));

        event.set();
        assert!(event.wait_timeout(Duration::from_millis(20)));
    }
}
