//! Effect runtime counters
//!
//! Each event is counted twice: in a thread-local slot, which is what a
//! computation's own thread can read back exactly, and in a process-wide
//! atomic total, which is what the SIGQUIT diagnostics thread can see.
//!
//! # Performance
//!
//! - **Thread-local update**: one `Cell` read and write
//! - **Total update**: one relaxed `fetch_add` (no contention beyond the cache line)
//! - **Reads**: only from diagnostics and tests

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

/// Runtime events that are counted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// A handler was installed
    Handles,
    /// A continuation was captured for a command clause
    Captures,
    /// A resumption was resumed directly
    Resumes,
    /// A resumption was handed to the trampoline
    TailResumes,
    /// A plain clause ran without capturing anything
    PlainDispatches,
    /// A captured continuation was dropped without being resumed
    Discarded,
    /// A fiber was created
    FibersCreated,
    /// A fiber stack came from the pool instead of a fresh allocation
    StacksReused,
}

const COUNTERS: usize = 8;

static TOTALS: [AtomicU64; COUNTERS] = [const { AtomicU64::new(0) }; COUNTERS];

thread_local! {
    static LOCAL: [Cell<u64>; COUNTERS] = const { [const { Cell::new(0) }; COUNTERS] };
}

/// Count one event
#[inline]
pub fn bump(counter: Counter) {
    let idx = counter as usize;
    LOCAL.with(|local| local[idx].set(local[idx].get() + 1));
    TOTALS[idx].fetch_add(1, Ordering::Relaxed);
}

/// Snapshot of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectStats {
    pub handles: u64,
    pub captures: u64,
    pub resumes: u64,
    pub tail_resumes: u64,
    pub plain_dispatches: u64,
    pub discarded: u64,
    pub fibers_created: u64,
    pub stacks_reused: u64,
}

impl EffectStats {
    fn from_counts(counts: [u64; COUNTERS]) -> Self {
        Self {
            handles: counts[Counter::Handles as usize],
            captures: counts[Counter::Captures as usize],
            resumes: counts[Counter::Resumes as usize],
            tail_resumes: counts[Counter::TailResumes as usize],
            plain_dispatches: counts[Counter::PlainDispatches as usize],
            discarded: counts[Counter::Discarded as usize],
            fibers_created: counts[Counter::FibersCreated as usize],
            stacks_reused: counts[Counter::StacksReused as usize],
        }
    }

    /// Counter-wise difference, for measuring a region of code
    pub fn since(&self, earlier: &EffectStats) -> EffectStats {
        EffectStats {
            handles: self.handles - earlier.handles,
            captures: self.captures - earlier.captures,
            resumes: self.resumes - earlier.resumes,
            tail_resumes: self.tail_resumes - earlier.tail_resumes,
            plain_dispatches: self.plain_dispatches - earlier.plain_dispatches,
            discarded: self.discarded - earlier.discarded,
            fibers_created: self.fibers_created - earlier.fibers_created,
            stacks_reused: self.stacks_reused - earlier.stacks_reused,
        }
    }
}

/// Counters of the calling thread
pub fn thread_stats() -> EffectStats {
    let counts = LOCAL.with(|local| std::array::from_fn(|i| local[i].get()));
    EffectStats::from_counts(counts)
}

/// Process-wide totals
pub fn global_stats() -> EffectStats {
    EffectStats::from_counts(std::array::from_fn(|i| TOTALS[i].load(Ordering::Relaxed)))
}
