//! # Barrier
//!
//! Reusable rendezvous for a fixed party count. All parties block in
//! [`Barrier::wait`] until the last one arrives, at which point every
//! party is released simultaneously and the barrier resets for reuse.
//!
//! Reuse is generation-counted: a party released from generation `g`
//! cannot be confused with one arriving for generation `g + 1`, even if
//! it loops straight back into `wait`.

use parking_lot::{Condvar, Mutex};

struct BarrierState {
    arrived: u32,
    generation: u64,
}

/// A reusable rendezvous point for a fixed number of threads.
pub struct Barrier {
    parties: u32,
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl Barrier {
    /// Creates a barrier for `parties` threads.
    ///
    /// # Panics
    ///
    /// Panics if `parties` is zero.
    #[must_use]
    pub fn new(parties: u32) -> Self {
        assert!(parties > 0, "a barrier needs at least one party");
        Self {
            parties,
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
            }),
            released: Condvar::new(),
        }
    }

    /// Blocks until all parties have arrived.
    ///
    /// Returns `true` for exactly one caller per generation: the arrival
    /// that released the barrier.
    pub fn wait(&self) -> bool {
        let mut state = self.state.lock();
        let generation = state.generation;

        state.arrived += 1;
        if state.arrived == self.parties {
            state.arrived = 0;
            state.generation += 1;
            self.released.notify_all();
            return true;
        }

        while state.generation == generation {
            self.released.wait(&mut state);
        }
        false
    }
}
