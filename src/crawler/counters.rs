//! Shared progress counters
//!
//! One mutex guards the in-flight count and the three pending counts so that
//! the quiescence check always sees a consistent picture. A dequeue moves a
//! task from "pending" to "running" in a single step; there is no instant at
//! which a task taken from a queue is counted nowhere.

use crate::crawler::task::Stage;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A point-in-time copy of the counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Tasks taken from any queue and not yet finished
    pub running: u64,
    pub pending_fetch: u64,
    pub pending_parse: u64,
    pub pending_save: u64,
}

impl CounterSnapshot {
    /// Returns the pending count for one stage
    pub fn pending(&self, stage: Stage) -> u64 {
        match stage {
            Stage::Fetch => self.pending_fetch,
            Stage::Parse => self.pending_parse,
            Stage::Save => self.pending_save,
        }
    }

    /// True when nothing is queued and nothing is executing
    pub fn is_quiescent(&self) -> bool {
        self.running == 0
            && self.pending_fetch == 0
            && self.pending_parse == 0
            && self.pending_save == 0
    }

    fn pending_mut(&mut self, stage: Stage) -> &mut u64 {
        match stage {
            Stage::Fetch => &mut self.pending_fetch,
            Stage::Parse => &mut self.pending_parse,
            Stage::Save => &mut self.pending_save,
        }
    }
}

/// Mutex-protected counters shared by every queue and worker
#[derive(Debug, Default)]
pub struct SharedCounters {
    inner: Mutex<CounterSnapshot>,
}

impl SharedCounters {
    /// Creates counters starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CounterSnapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one task entering a stage queue
    pub fn enqueued(&self, stage: Stage) {
        *self.lock().pending_mut(stage) += 1;
    }

    /// Records one task leaving a stage queue and starting execution
    pub fn dequeued(&self, stage: Stage) {
        let mut counts = self.lock();
        let pending = counts.pending_mut(stage);
        *pending = pending.saturating_sub(1);
        counts.running += 1;
    }

    /// Records that an executing task has been fully processed
    pub fn finished(&self) {
        let mut counts = self.lock();
        counts.running = counts.running.saturating_sub(1);
    }

    /// Returns a consistent copy of all counters
    pub fn snapshot(&self) -> CounterSnapshot {
        *self.lock()
    }

    /// True when every queue is empty and no task is executing
    pub fn all_done(&self) -> bool {
        self.lock().is_quiescent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_counters_are_quiescent() {
        let counters = SharedCounters::new();
        assert!(counters.all_done());
        assert_eq!(counters.snapshot(), CounterSnapshot::default());
    }

    #[test]
    fn test_enqueue_dequeue_finish_cycle() {
        let counters = SharedCounters::new();

        counters.enqueued(Stage::Fetch);
        assert!(!counters.all_done());
        assert_eq!(counters.snapshot().pending_fetch, 1);

        counters.dequeued(Stage::Fetch);
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.pending_fetch, 0);
        assert_eq!(snapshot.running, 1);
        assert!(!counters.all_done());

        counters.finished();
        assert!(counters.all_done());
    }

    #[test]
    fn test_pending_per_stage() {
        let counters = SharedCounters::new();
        counters.enqueued(Stage::Parse);
        counters.enqueued(Stage::Save);
        counters.enqueued(Stage::Save);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.pending(Stage::Fetch), 0);
        assert_eq!(snapshot.pending(Stage::Parse), 1);
        assert_eq!(snapshot.pending(Stage::Save), 2);
    }

    #[test]
    fn test_running_blocks_quiescence_after_queues_empty() {
        let counters = SharedCounters::new();
        counters.enqueued(Stage::Parse);
        counters.dequeued(Stage::Parse);

        // Work handed off to the save stage before the parse task finishes
        counters.enqueued(Stage::Save);
        counters.finished();
        assert!(!counters.all_done());

        counters.dequeued(Stage::Save);
        assert!(!counters.all_done());
        counters.finished();
        assert!(counters.all_done());
    }

    #[test]
    fn test_finished_never_underflows() {
        let counters = SharedCounters::new();
        counters.finished();
        assert_eq!(counters.snapshot().running, 0);
    }
}
