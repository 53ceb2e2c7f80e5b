//! # Fork-Join Parallel For
//!
//! Splits an iteration range into blocks, spreads them across the worker
//! pool through recursive task fan-out, and joins without taking a lock
//! on the hot path.
//!
//! ## Architecture
//!
//! ```text
//!   caller ──▶ parallel_for ──▶ ParallelForData (control block)
//!                 │                   ▲  ▲  ▲
//!                 │ dispatch          │  │  │  claim blocks via
//!                 ▼                   │  │  │  atomic fetch-add
//!          ParallelForTask ───────────┘  │  │
//!                 │ dispatch (budget-1)  │  │
//!                 ▼                      │  │
//!          ParallelForTask ──────────────┘  │
//!                 │ ...                     │
//!          caller also claims ─────────────-┘
//! ```
//!
//! Whichever participant drains the last block observes completion and
//! either returns directly (the caller) or signals the completion event
//! (a worker). The caller waits on the event only when it did not observe
//! completion itself.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use kiln_sync::{Event, EventKind};

use crate::dispatcher::{Dispatcher, Task};

/// Static partitioning of an iteration range into claimable blocks.
///
/// Deterministic for fixed inputs, and exact:
/// `block_size * (blocks - 1) + (block_size + overhead) == count`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Partition {
    /// Number of claimable blocks. Always at least one.
    pub blocks: u32,
    /// Iterations in a normal block. Always at least one.
    pub block_size: u32,
    /// Remainder iterations, folded into the block claimed last - never
    /// spread evenly.
    pub overhead: u32,
}

impl Partition {
    /// Computes the partition for `count` iterations over `participants`
    /// threads (workers plus the calling thread).
    ///
    /// Walks divisors 6 down to 1, preferring fine-grained blocks (small
    /// fractions of `count / participants`) and falling back to coarser
    /// ones only when fine blocks would leave some participant without a
    /// block. When no divisor satisfies the bound, the divisor-1 split
    /// stands.
    ///
    /// # Panics
    ///
    /// Panics if `participants` is zero or `count < participants`; both
    /// indicate a scheduling bug in the caller, not a runtime input.
    #[must_use]
    pub fn compute(count: u32, participants: u32, last_block_for_master: bool) -> Self {
        assert!(participants > 0, "partition needs at least one participant");
        assert!(
            count >= participants,
            "parallel-for scheduled {participants} participants over {count} iterations"
        );

        let wanted = participants + u32::from(last_block_for_master);
        let mut block_size = 0;
        let mut blocks = 0;

        for divisor in (1..=6).rev() {
            block_size = count / (participants * divisor);
            if block_size != 0 {
                blocks = count / block_size;
                if blocks >= wanted {
                    break;
                }
            }
        }

        debug_assert!(block_size != 0 && blocks != 0);
        Self {
            blocks,
            block_size,
            overhead: count - blocks * block_size,
        }
    }
}

/// Shared control block for one in-flight parallel-for invocation.
///
/// Held by the calling thread and by every spawned fan-out task; the last
/// holder to release it runs the teardown invariant checks.
struct ParallelForData {
    /// The work closure; invoked read-only by every participant.
    code: Box<dyn Fn(u32) + Send + Sync>,
    /// Where fan-out tasks are sent.
    dispatcher: Arc<dyn Dispatcher>,
    /// Completion signal; set at most once, waited on at most once.
    sync: Event,
    /// Block-claim cursor. Only ever increases.
    index: AtomicU32,
    /// Count of finished blocks.
    completed: AtomicU32,
    partition: Partition,
    /// Whether the final block is reserved for the calling thread.
    last_block_for_master: bool,
    /// Debug invariant: all blocks were drained before teardown.
    exited: AtomicBool,
    /// Debug invariant: the event is signaled at most once.
    triggered: AtomicBool,
}

impl ParallelForData {
    fn new(
        dispatcher: Arc<dyn Dispatcher>,
        count: u32,
        participants: u32,
        last_block_for_master: bool,
        code: Box<dyn Fn(u32) + Send + Sync>,
    ) -> Arc<Self> {
        Arc::new(Self {
            code,
            dispatcher,
            sync: Event::new(false, EventKind::ManualReset),
            index: AtomicU32::new(0),
            completed: AtomicU32::new(0),
            partition: Partition::compute(count, participants, last_block_for_master),
            last_block_for_master,
            exited: AtomicBool::new(false),
            triggered: AtomicBool::new(false),
        })
    }

    /// Claims and executes blocks until the range is drained.
    ///
    /// Returns `true` iff this call observed global completion - in that
    /// case nobody else will ever signal the event, so the caller must
    /// not wait on it.
    fn process(self: &Arc<Self>, tasks_to_spawn: u32, is_master: bool) -> bool {
        let _span = tracing::trace_span!("parallel_for_process").entered();

        // Fan out before doing any work of our own: each hop re-dispatches
        // a single task carrying the rest of the spawn budget, spreading
        // dispatch cost across the tree instead of one thread.
        let remaining = self
            .partition
            .blocks
            .saturating_sub(self.index.load(Ordering::Relaxed));
        if tasks_to_spawn > 0 && remaining > 0 {
            let budget = tasks_to_spawn.min(remaining);
            self.dispatcher.dispatch(Box::new(ParallelForTask {
                data: Arc::clone(self),
                tasks_to_spawn: budget - 1,
            }));
        }

        let Partition {
            blocks,
            block_size,
            overhead,
        } = self.partition;

        loop {
            let mut claimed = self.index.fetch_add(1, Ordering::Relaxed);

            if self.last_block_for_master {
                // The final block is the master's. Workers stop short of
                // it; the master clamps an overshoot back down so it
                // always performs the reserved block instead of idling.
                if !is_master && claimed >= blocks - 1 {
                    break;
                }
                if is_master && claimed > blocks - 1 {
                    claimed = blocks - 1;
                }
            }

            if claimed < blocks {
                let mut this_block = block_size;
                if claimed == blocks - 1 {
                    this_block += overhead;
                }

                let base = claimed * block_size;
                for offset in 0..this_block {
                    (self.code)(base + offset);
                }

                debug_assert!(
                    !self.exited.load(Ordering::Relaxed),
                    "block executed after the invocation exited"
                );

                let done = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
                if done == blocks {
                    return true;
                }
                debug_assert!(done < blocks, "completed counter overran the block count");
            }

            if claimed >= blocks - 1 {
                break;
            }
        }

        false
    }

    fn mark_exited(&self) {
        debug_assert_eq!(
            self.completed.load(Ordering::Acquire),
            self.partition.blocks
        );
        self.exited.store(true, Ordering::Release);
    }
}

impl Drop for ParallelForData {
    fn drop(&mut self) {
        // Terminal-state check: anything else here is a defect in the
        // claim/signal protocol, not a runtime condition.
        debug_assert!(self.index.load(Ordering::Relaxed) >= self.partition.blocks);
        debug_assert_eq!(self.completed.load(Ordering::Relaxed), self.partition.blocks);
        debug_assert!(self.exited.load(Ordering::Relaxed));
    }
}

/// One hop of the fan-out tree: processes blocks and, while its budget
/// lasts, re-dispatches a successor carrying the rest of the budget.
struct ParallelForTask {
    data: Arc<ParallelForData>,
    tasks_to_spawn: u32,
}

impl Task for ParallelForTask {
    fn run(self: Box<Self>) {
        if self.data.process(self.tasks_to_spawn, false) {
            let already = self.data.triggered.swap(true, Ordering::AcqRel);
            debug_assert!(!already, "completion event signaled twice");
            self.data.sync.set();
        }
    }
}

/// Number of worker threads to fan out over, zero meaning "run the whole
/// range sequentially on the caller".
fn fan_out(dispatcher: &Arc<dyn Dispatcher>, count: u32, single_threaded: bool) -> u32 {
    if count <= 1 || single_threaded {
        return 0;
    }
    let workers = u32::try_from(dispatcher.worker_count()).unwrap_or(u32::MAX);
    workers.min(count - 1)
}

/// Dispatches one fan-out task, processes blocks on the calling thread,
/// and waits for the completion event only if this thread did not itself
/// observe completion.
fn dispatch_and_join(data: &Arc<ParallelForData>, spawn_budget: u32) {
    data.dispatcher.dispatch(Box::new(ParallelForTask {
        data: Arc::clone(data),
        tasks_to_spawn: spawn_budget,
    }));

    if data.process(0, true) {
        debug_assert!(!data.triggered.load(Ordering::Relaxed));
    } else {
        let _span = tracing::trace_span!("parallel_for_waiting").entered();
        data.sync.wait();
        debug_assert!(data.triggered.load(Ordering::Relaxed));
    }

    data.mark_exited();
}

/// Runs `code(index)` for every `index` in `[0, count)`, in parallel
/// across the dispatcher's workers and the calling thread.
///
/// Blocks until every index has been executed. Callback invocations for
/// distinct indices may run concurrently on different threads in any
/// order; the closure must be safe to call concurrently over disjoint
/// indices and must synchronize any shared state it touches.
///
/// If `count <= 1`, `single_threaded` is set, or the dispatcher reports
/// zero workers, the range runs strictly sequentially on the calling
/// thread - no allocation, no dispatch, no synchronization.
///
/// There is no cancellation and no timeout: if the dispatcher never runs
/// a spawned task, this call deadlocks.
pub fn parallel_for<F>(dispatcher: &Arc<dyn Dispatcher>, count: u32, code: F, single_threaded: bool)
where
    F: Fn(u32) + Send + Sync + 'static,
{
    let _span = tracing::trace_span!("parallel_for", count).entered();

    let threads = fan_out(dispatcher, count, single_threaded);
    if threads == 0 {
        for index in 0..count {
            code(index);
        }
        return;
    }

    // One extra participant: the calling thread claims blocks too. The
    // final block is reserved for it whenever there are more blocks than
    // participants to keep it busy until the very end.
    let data = ParallelForData::new(
        Arc::clone(dispatcher),
        count,
        threads + 1,
        count > threads + 1,
        Box::new(code),
    );

    dispatch_and_join(&data, threads - 1);
}

/// Like [`parallel_for`], but invokes `preprocess` on the calling thread
/// after the fan-out task has been dispatched and before this thread
/// starts claiming blocks, overlapping preparation work with worker
/// startup.
///
/// This variant never reserves the final block for the calling thread.
pub fn parallel_for_with_setup<F, P>(
    dispatcher: &Arc<dyn Dispatcher>,
    count: u32,
    code: F,
    preprocess: P,
    single_threaded: bool,
) where
    F: Fn(u32) + Send + Sync + 'static,
    P: FnOnce(),
{
    let _span = tracing::trace_span!("parallel_for", count).entered();

    let threads = fan_out(dispatcher, count, single_threaded);
    if threads == 0 {
        preprocess();
        for index in 0..count {
            code(index);
        }
        return;
    }

    let data = ParallelForData::new(
        Arc::clone(dispatcher),
        count,
        threads,
        false,
        Box::new(code),
    );

    data.dispatcher.dispatch(Box::new(ParallelForTask {
        data: Arc::clone(&data),
        tasks_to_spawn: threads - 1,
    }));

    preprocess();

    if data.process(0, true) {
        debug_assert!(!data.triggered.load(Ordering::Relaxed));
    } else {
        let _wait = tracing::trace_span!("parallel_for_waiting").entered();
        data.sync.wait();
        debug_assert!(data.triggered.load(Ordering::Relaxed));
    }

    data.mark_exited();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::InlineDispatcher;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn inline(workers: usize) -> (Arc<InlineDispatcher>, Arc<dyn Dispatcher>) {
        let concrete = Arc::new(InlineDispatcher::new(workers));
        let erased: Arc<dyn Dispatcher> = Arc::clone(&concrete) as Arc<dyn Dispatcher>;
        (concrete, erased)
    }

    #[test]
    fn partition_is_deterministic_and_exact() {
        for count in [1, 2, 7, 16, 100, 101, 1000, 99_991] {
            for participants in [1, 2, 3, 8] {
                if count < participants {
                    continue;
                }
                for master in [false, true] {
                    let first = Partition::compute(count, participants, master);
                    let second = Partition::compute(count, participants, master);
                    assert_eq!(first, second);

                    assert!(first.blocks >= 1);
                    assert!(first.block_size >= 1);
                    let covered =
                        first.block_size * (first.blocks - 1) + first.block_size + first.overhead;
                    assert_eq!(covered, count, "partition must cover the range exactly");
                }
            }
        }
    }

    #[test]
    fn partition_prefers_fine_blocks() {
        // 1200 iterations over 4 participants: divisor 6 already yields
        // 50-wide blocks and 24 of them, plenty for 4 participants.
        let partition = Partition::compute(1200, 4, false);
        assert_eq!(partition.block_size, 50);
        assert_eq!(partition.blocks, 24);
        assert_eq!(partition.overhead, 0);
    }

    #[test]
    fn partition_folds_remainder_into_last_block() {
        // 101 iterations over 3 participants: divisor 6 gives 5-wide
        // blocks, 20 of them, and a single leftover iteration folded into
        // the last claimed block rather than spread evenly.
        let partition = Partition::compute(101, 3, false);
        assert_eq!(partition.block_size, 5);
        assert_eq!(partition.blocks, 20);
        assert_eq!(partition.overhead, 1);
    }

    #[test]
    fn partition_keeps_divisor_one_split_when_bound_unmet() {
        // With as many blocks as iterations and the last one reserved for
        // the master, no divisor can satisfy the bound; the divisor-1
        // split stands (original behavior, preserved exactly).
        let partition = Partition::compute(4, 4, true);
        assert_eq!(partition.block_size, 1);
        assert_eq!(partition.blocks, 4);
        assert_eq!(partition.overhead, 0);
    }

    #[test]
    #[should_panic(expected = "participants")]
    fn partition_rejects_too_many_participants() {
        let _ = Partition::compute(2, 3, false);
    }

    #[test]
    fn degenerate_paths_never_dispatch() {
        for (count, single_threaded, workers) in [(0, false, 4), (1, false, 4), (10, true, 4), (10, false, 0)] {
            let (concrete, erased) = inline(workers);
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);

            parallel_for(
                &erased,
                count,
                move |index| sink.lock().unwrap().push(index),
                single_threaded,
            );

            assert_eq!(concrete.dispatch_count(), 0);
            // Strictly sequential and ascending.
            let seen = seen.lock().unwrap();
            assert_eq!(*seen, (0..count).collect::<Vec<_>>());
        }
    }

    #[test]
    fn covers_every_index_exactly_once_inline() {
        for workers in [1, 2, 8] {
            for count in [2, 3, 17, 100, 1001] {
                let (_, dispatcher) = inline(workers);
                let hits = Arc::new(Mutex::new(vec![0u32; count as usize]));
                let sink = Arc::clone(&hits);

                parallel_for(
                    &dispatcher,
                    count,
                    move |index| sink.lock().unwrap()[index as usize] += 1,
                    false,
                );

                let hits = hits.lock().unwrap();
                assert!(
                    hits.iter().all(|&visits| visits == 1),
                    "workers={workers} count={count}: every index exactly once"
                );
            }
        }
    }

    #[test]
    fn with_setup_runs_preprocess_before_blocks() {
        let (_, dispatcher) = inline(2);
        let order = Arc::new(Mutex::new(Vec::new()));

        // With the inline dispatcher the fan-out task drains the whole
        // range during dispatch, before preprocess runs on the caller;
        // with a real pool the orders interleave. Only the caller-side
        // ordering is guaranteed: preprocess before the caller's blocks.
        let trace = Arc::clone(&order);
        let pre = Arc::clone(&order);
        parallel_for_with_setup(
            &dispatcher,
            8,
            move |index| trace.lock().unwrap().push(format!("block:{index}")),
            move || pre.lock().unwrap().push("preprocess".to_owned()),
            false,
        );

        let order = order.lock().unwrap();
        assert_eq!(order.iter().filter(|entry| *entry == "preprocess").count(), 1);
        assert_eq!(order.len(), 9);
    }

    #[test]
    fn with_setup_single_threaded_runs_preprocess_first() {
        let (concrete, erased) = inline(4);
        let order = Arc::new(Mutex::new(Vec::new()));

        let trace = Arc::clone(&order);
        let pre = Arc::clone(&order);
        parallel_for_with_setup(
            &erased,
            4,
            move |index| trace.lock().unwrap().push(index as i64),
            move || pre.lock().unwrap().push(-1),
            true,
        );

        assert_eq!(concrete.dispatch_count(), 0);
        assert_eq!(*order.lock().unwrap(), vec![-1, 0, 1, 2, 3]);
    }

    #[test]
    fn fan_out_dispatch_count_is_bounded_by_budget() {
        // Spawn budget threads-1 = 7; each hop dispatches at most one
        // successor, so dispatch calls are at most 1 + budget.
        let (concrete, erased) = inline(8);
        let executed = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&executed);
        parallel_for(
            &erased,
            1000,
            move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
            },
            false,
        );

        assert_eq!(executed.load(Ordering::Relaxed), 1000);
        assert!(concrete.dispatch_count() >= 1);
        assert!(concrete.dispatch_count() <= 8);
    }

    #[test]
    fn teardown_invariants_hold_after_process() {
        let (_, dispatcher) = inline(3);
        let data = ParallelForData::new(
            Arc::clone(&dispatcher),
            100,
            4,
            true,
            Box::new(|_| {}),
        );

        // Drive the invocation the way parallel_for would.
        dispatch_and_join(&data, 2);

        assert!(data.index.load(Ordering::Relaxed) >= data.partition.blocks);
        assert_eq!(data.completed.load(Ordering::Relaxed), data.partition.blocks);
        assert!(data.exited.load(Ordering::Relaxed));
        assert!(!data.sync.test() || data.triggered.load(Ordering::Relaxed));
    }
}
