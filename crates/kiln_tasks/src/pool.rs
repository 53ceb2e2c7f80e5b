//! # Worker Pool
//!
//! The production [`Dispatcher`]: a fixed set of named worker threads
//! draining an unbounded task channel. Dropping the pool closes the
//! channel; workers finish whatever is already queued and exit, and the
//! drop joins them all.

use std::io;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use thiserror::Error;

use crate::dispatcher::{Dispatcher, Task};

/// Errors that can occur while bringing up a worker pool.
#[derive(Error, Debug)]
pub enum PoolError {
    /// A pool needs at least one worker thread.
    #[error("worker pool needs at least one thread")]
    NoWorkers,

    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// A fixed-size pool of worker threads implementing [`Dispatcher`].
pub struct WorkerPool {
    /// `None` only during drop, after shutdown has begun.
    sender: Option<Sender<Box<dyn Task>>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `threads` named worker threads.
    ///
    /// # Errors
    ///
    /// [`PoolError::NoWorkers`] if `threads` is zero,
    /// [`PoolError::Spawn`] if the OS refuses to create a thread.
    pub fn new(threads: usize) -> Result<Self, PoolError> {
        if threads == 0 {
            return Err(PoolError::NoWorkers);
        }

        let (sender, receiver) = unbounded::<Box<dyn Task>>();
        let mut workers = Vec::with_capacity(threads);

        for index in 0..threads {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("kiln-worker-{index}"))
                .spawn(move || worker_loop(index, &receiver))?;
            workers.push(handle);
        }

        tracing::debug!(threads, "worker pool started");
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }
}

fn worker_loop(index: usize, receiver: &Receiver<Box<dyn Task>>) {
    tracing::debug!(worker = index, "worker thread started");
    while let Ok(task) = receiver.recv() {
        tracing::trace!(worker = index, "running task");
        task.run();
    }
    tracing::debug!(worker = index, "worker thread stopped");
}

impl Dispatcher for WorkerPool {
    fn dispatch(&self, task: Box<dyn Task>) {
        // The sender only disappears once drop has begun, and send only
        // fails once every worker is gone. Either one here is a misuse of
        // the pool's lifetime, not a runtime condition.
        let sender = self.sender.as_ref();
        let delivered = sender.is_some_and(|sender| sender.send(task).is_ok());
        assert!(delivered, "task dispatched to a worker pool that is shutting down");
    }

    fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel is the shutdown signal; workers drain the
        // queue and exit on disconnect.
        drop(self.sender.take());
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        tracing::debug!("worker pool stopped");
    }
}
