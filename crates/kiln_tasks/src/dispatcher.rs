//! # Task Dispatch Abstraction
//!
//! The scheduler never talks to a concrete thread pool. It fans out
//! through [`Dispatcher`], an injected dependency, so that unit tests can
//! run against a synchronous inline double while production code wires in
//! a real worker pool.

use std::sync::atomic::{AtomicUsize, Ordering};

/// A one-shot unit of work.
///
/// Tasks may recursively dispatch further tasks while running; the
/// parallel-for fan-out tree relies on this.
pub trait Task: Send {
    /// Runs the task, consuming it.
    fn run(self: Box<Self>);
}

impl<F: FnOnce() + Send> Task for F {
    fn run(self: Box<Self>) {
        (*self)();
    }
}

/// Hands tasks to a pool of worker threads.
///
/// The only delivery contract is *eventually, unordered, on some pool
/// thread* - provided the implementation makes progress at all. A
/// dispatcher that never runs a task will deadlock any caller waiting on
/// that task's side effects; that risk is acknowledged, not mitigated.
pub trait Dispatcher: Send + Sync {
    /// Enqueues a task for eventual execution.
    fn dispatch(&self, task: Box<dyn Task>);

    /// Configured logical worker-thread count.
    ///
    /// Used only to size fan-out; it is not a liveness guarantee.
    fn worker_count(&self) -> usize;
}

/// Deterministic test double: runs every task synchronously on the
/// dispatching thread, while reporting a configurable worker count.
///
/// Also counts `dispatch` calls so tests can assert that degenerate
/// scheduler paths never dispatch anything.
pub struct InlineDispatcher {
    workers: usize,
    dispatched: AtomicUsize,
}

impl InlineDispatcher {
    /// Creates an inline dispatcher that claims `workers` worker threads.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            dispatched: AtomicUsize::new(0),
        }
    }

    /// Number of tasks dispatched so far.
    #[must_use]
    pub fn dispatch_count(&self) -> usize {
        self.dispatched.load(Ordering::Relaxed)
    }
}

impl Dispatcher for InlineDispatcher {
    fn dispatch(&self, task: Box<dyn Task>) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        task.run();
    }

    fn worker_count(&self) -> usize {
        self.workers
    }
}
