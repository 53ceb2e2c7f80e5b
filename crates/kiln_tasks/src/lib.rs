//! # KILN Tasks
//!
//! The fork-join parallel-for scheduler and the dispatch abstraction it
//! fans out through.
//!
//! ## Architecture Rules
//!
//! 1. **The dispatcher is injected, never ambient** - the scheduler only
//!    ever sees [`Dispatcher`]; tests substitute a deterministic inline
//!    double, production wires in a [`WorkerPool`].
//! 2. **No locks on the hot path** - block claiming and completion
//!    tracking are atomic fetch-and-increment; the completion event is
//!    touched only at the boundary (construction, one set, one wait).
//! 3. **Scheduling defects are fatal** - violated invariants panic in
//!    debug builds instead of being discarded.

pub mod dispatcher;
pub mod parallel_for;
pub mod pool;

pub use dispatcher::{Dispatcher, InlineDispatcher, Task};
pub use parallel_for::{parallel_for, parallel_for_with_setup, Partition};
pub use pool::{PoolError, WorkerPool};
